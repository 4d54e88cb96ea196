use std::{num::NonZeroUsize, sync::Arc};

use comms::{
    exchange,
    msg::{Command, Msg, Payload},
    specs::server::{ParamGenSpec, ServerSpec},
};
use machine_learning::models::LinearAccess;
use parameter_server::{build_server, service::{self, ServerHandle}};
use tokio::net::{TcpListener, TcpStream};

fn spec() -> ServerSpec {
    ServerSpec {
        learning_rate: 0.1,
        shards: NonZeroUsize::new(4).unwrap(),
        init: Some(ParamGenSpec::Const { value: 0.0 }),
        seed: None,
        barrier_timeout_secs: Some(10),
    }
}

/// Runs one worker's side of the protocol: join, one round over `keys`, epoch done
/// and disconnect.
async fn worker_round(addr: std::net::SocketAddr, keys: Vec<u64>, grad: f32) -> (usize, Vec<f32>) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (rx, tx) = stream.into_split();
    let (mut rx, mut tx) = comms::channel(rx, tx);
    let mut buf = Vec::new();

    tx.send(&Msg::Control(Command::Join)).await.unwrap();
    let Command::Assign { rank, workers } = exchange::recv_control(&mut rx, &mut buf).await.unwrap()
    else {
        panic!("expected assign");
    };
    assert_eq!(workers, 2);

    tx.send(&Msg::Control(Command::Pull)).await.unwrap();
    tx.send(&Msg::Data(Payload::Keys(&keys))).await.unwrap();
    let pulled = exchange::recv_values(&mut rx, &mut buf).await.unwrap().to_vec();

    let grads = vec![grad; keys.len()];
    tx.send(&Msg::Control(Command::Push)).await.unwrap();
    tx.send(&Msg::Data(Payload::Keys(&keys))).await.unwrap();
    tx.send(&Msg::Data(Payload::Values(&grads))).await.unwrap();
    exchange::recv_ack(&mut rx, &mut buf).await.unwrap();

    tx.send(&Msg::Control(Command::EpochDone)).await.unwrap();
    exchange::recv_ack(&mut rx, &mut buf).await.unwrap();

    tx.send(&Msg::Control(Command::Disconnect)).await.unwrap();
    (rank, pulled)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_workers_one_round() {
    let server = build_server(0, 2, LinearAccess::new(0.1), &spec()).unwrap();
    let handle = ServerHandle::new(Arc::new(server));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let serving = tokio::spawn(service::serve(listener, handle.clone()));

    let a = tokio::spawn(worker_round(addr, vec![1, 2], 1.0));
    let b = tokio::spawn(worker_round(addr, vec![2, 3], -1.0));
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    serving.await.unwrap().unwrap();

    let mut ranks = [a.0, b.0];
    ranks.sort();
    assert_eq!(ranks, [0, 1]);
    assert_eq!(a.1, [0.0, 0.0]);
    assert_eq!(b.1, [0.0, 0.0]);

    let store = handle.store();
    assert_eq!(store.len(), 3);
    assert!(store.with_param(1, |p| p.value).unwrap() > 0.0);
    assert!(store.with_param(3, |p| p.value).unwrap() < 0.0);
    assert_eq!(store.with_param(2, |p| p.grad2sum), Some(2.0));

    let dir = tempfile::tempdir().unwrap();
    let path = handle.dump(&dir.path().join("params")).unwrap();
    assert!(path.ends_with("params-0.txt"));

    let dumped = std::fs::read_to_string(path).unwrap();
    assert_eq!(dumped.lines().count(), 3);
    assert!(dumped.starts_with("1\t"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dropped_connection_leaves_the_cohort() {
    let server = build_server(0, 2, LinearAccess::new(0.1), &spec()).unwrap();
    let handle = ServerHandle::new(Arc::new(server));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let serving = tokio::spawn(service::serve(listener, handle.clone()));

    {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (rx, tx) = stream.into_split();
        let (mut rx, mut tx) = comms::channel(rx, tx);
        let mut buf = Vec::new();
        tx.send(&Msg::Control(Command::Join)).await.unwrap();
        exchange::recv_control(&mut rx, &mut buf).await.unwrap();
    }

    let stream = TcpStream::connect(addr).await.unwrap();
    let (rx, tx) = stream.into_split();
    let (mut rx, mut tx) = comms::channel(rx, tx);
    let mut buf = Vec::new();

    tx.send(&Msg::Control(Command::Join)).await.unwrap();
    exchange::recv_control(&mut rx, &mut buf).await.unwrap();

    // would wait for the dropped worker if it was still part of the cohort
    tx.send(&Msg::Control(Command::Pull)).await.unwrap();
    tx.send(&Msg::Data(Payload::Keys(&[4]))).await.unwrap();
    let pulled = exchange::recv_values(&mut rx, &mut buf).await.unwrap();
    assert_eq!(pulled, [0.0]);

    tx.send(&Msg::Control(Command::Disconnect)).await.unwrap();
    serving.await.unwrap().unwrap();
}
