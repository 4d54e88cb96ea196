use comms::msg::{Command, Msg, Payload};
use tokio::io;

#[tokio::test]
async fn send_recv_control() {
    const SIZE: usize = 128;

    let (one, two) = io::duplex(SIZE);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    tx.send(&Msg::Control(Command::Join)).await.unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf: Vec<u64> = Vec::new();
    let msg: Msg = rx.recv_into(&mut buf).await.unwrap();

    assert_eq!(msg, Msg::Control(Command::Join));
}

#[tokio::test]
async fn send_recv_pull_sequence() {
    const SIZE: usize = 4096;

    let keys = [7u64, 11, 13];
    let values = [0.5f32, -1.25, 3.0, 4.5, 5.0, 6.0];

    let (one, two) = io::duplex(SIZE);
    let (one_rx, one_tx) = io::split(one);
    let (_, mut tx) = comms::channel(one_rx, one_tx);
    let (two_rx, two_tx) = io::split(two);
    let (mut rx, _) = comms::channel(two_rx, two_tx);

    tx.send(&Msg::Control(Command::Pull)).await.unwrap();
    tx.send(&Msg::Data(Payload::Keys(&keys))).await.unwrap();
    tx.send(&Msg::Data(Payload::Values(&values))).await.unwrap();
    tx.send(&Msg::Err("boom".into())).await.unwrap();

    let mut ctl_buf: Vec<u64> = Vec::new();
    let mut keys_buf: Vec<u64> = Vec::new();
    let mut vals_buf: Vec<u64> = Vec::new();

    let ctl: Msg = rx.recv_into(&mut ctl_buf).await.unwrap();
    let got_keys: Msg = rx.recv_into(&mut keys_buf).await.unwrap();
    let got_values: Msg = rx.recv_into(&mut vals_buf).await.unwrap();

    assert_eq!(ctl, Msg::Control(Command::Pull));
    assert_eq!(got_keys, Msg::Data(Payload::Keys(&keys)));
    assert_eq!(got_values, Msg::Data(Payload::Values(&values)));

    let err: Msg = rx.recv_into(&mut ctl_buf).await.unwrap();
    assert_eq!(err, Msg::Err("boom".into()));
}

#[tokio::test]
async fn empty_keys_are_valid() {
    let (one, two) = io::duplex(64);
    let (one_rx, one_tx) = io::split(one);
    let (_, mut tx) = comms::channel(one_rx, one_tx);
    let (two_rx, two_tx) = io::split(two);
    let (mut rx, _) = comms::channel(two_rx, two_tx);

    tx.send(&Msg::Data(Payload::Keys(&[]))).await.unwrap();

    let mut buf: Vec<u64> = Vec::new();
    let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
    assert_eq!(msg, Msg::Data(Payload::Keys(&[])));
}

#[tokio::test]
async fn fed_frames_arrive_after_flush() {
    let keys = [1u64, 2, 3];
    let grads = [0.25f32; 3];

    let (one, two) = io::duplex(4096);
    let (one_rx, one_tx) = io::split(one);
    let (_, mut tx) = comms::channel(one_rx, one_tx);
    let (two_rx, two_tx) = io::split(two);
    let (mut rx, _) = comms::channel(two_rx, two_tx);

    tx.feed(&Msg::Control(Command::Push)).await.unwrap();
    tx.feed(&Msg::Data(Payload::Keys(&keys))).await.unwrap();
    tx.feed(&Msg::Data(Payload::Values(&grads))).await.unwrap();

    let mut buf: Vec<u64> = Vec::new();
    let pending = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        rx.recv_into::<Msg, _>(&mut buf),
    )
    .await;
    assert!(pending.is_err());

    tx.flush().await.unwrap();

    let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
    assert_eq!(msg, Msg::Control(Command::Push));
    let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
    assert_eq!(msg, Msg::Data(Payload::Keys(&keys)));
    let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
    assert_eq!(msg, Msg::Data(Payload::Values(&grads)));
}
