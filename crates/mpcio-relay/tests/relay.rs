use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use mpcio::cleartext::ClearEngine;
use mpcio::runner::{Invocation, Runner};
use mpcio::transport::ws;
use mpcio_test_utils::{ADD32, from_bits, to_bits};
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

async fn start_relay() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, mpcio_relay::router()).await.unwrap();
    });
    addr
}

#[tokio::test(flavor = "multi_thread")]
async fn messages_buffer_until_the_second_participant_joins() {
    let addr = start_relay().await;
    let (mut first, _) = connect_async(format!("ws://{addr}/buffered")).await.unwrap();
    first
        .send(Message::Binary(vec![b'a', 1, 2, 3]))
        .await
        .unwrap();
    first.send(Message::Binary(vec![b'b', 9])).await.unwrap();

    let (mut second, _) = connect_async(format!("ws://{addr}/buffered")).await.unwrap();
    assert_eq!(
        second.next().await.unwrap().unwrap().into_data(),
        vec![b'a', 1, 2, 3]
    );
    assert_eq!(second.next().await.unwrap().unwrap().into_data(), vec![b'b', 9]);

    // Once paired, units flow directly in both directions.
    second.send(Message::Binary(vec![b'a', 7])).await.unwrap();
    assert_eq!(first.next().await.unwrap().unwrap().into_data(), vec![b'a', 7]);
}

#[tokio::test(flavor = "multi_thread")]
async fn a_third_connection_is_rejected() {
    let addr = start_relay().await;
    let (_first, _) = connect_async(format!("ws://{addr}/crowded")).await.unwrap();
    let (_second, _) = connect_async(format!("ws://{addr}/crowded")).await.unwrap();

    let (mut third, _) = connect_async(format!("ws://{addr}/crowded")).await.unwrap();
    let shutdown = tokio::time::timeout(Duration::from_secs(5), third.next())
        .await
        .expect("the relay must answer the third connection");
    match shutdown {
        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {}
        other => panic!("expected a close, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn exceeding_the_buffer_cap_closes_the_connection() {
    let addr = start_relay().await;
    let (mut first, _) = connect_async(format!("ws://{addr}/hoarder")).await.unwrap();

    // Nobody is paired, so everything buffers; the cap is 1 MiB. The second
    // unit crosses the cap, after which sends may already fail.
    first
        .send(Message::Binary(vec![0; 600 * 1024]))
        .await
        .unwrap();
    let _ = first.send(Message::Binary(vec![0; 600 * 1024])).await;
    let shutdown = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match first.next().await {
                Some(Ok(Message::Close(frame))) => break Some(frame),
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => break None,
            }
        }
    })
    .await
    .expect("the relay must close the hoarding connection");
    if let Some(Some(frame)) = shutdown {
        assert_eq!(frame.code, 1009.into());
    }

    // The identifier is free again afterwards.
    let (mut fresh, _) = connect_async(format!("ws://{addr}/hoarder")).await.unwrap();
    fresh.send(Message::Binary(vec![b'a', 1])).await.unwrap();
    let (mut peer, _) = connect_async(format!("ws://{addr}/hoarder")).await.unwrap();
    assert_eq!(peer.next().await.unwrap().unwrap().into_data(), vec![b'a', 1]);
}

#[tokio::test(flavor = "multi_thread")]
async fn two_parties_add_through_the_relay() {
    let addr = start_relay().await;
    let url = format!("ws://{addr}/add32-e2e");

    let io0 = ws::connect(&url, 1).await.unwrap();
    let io1 = ws::connect(&url, 0).await.unwrap();

    let party0 = tokio::spawn(async move {
        Runner::new(ClearEngine)
            .run(Invocation::new(0, 2, ADD32, to_bits(3, 32), vec![32, 32]), io0)
            .await
    });
    let party1 = tokio::spawn(async move {
        Runner::new(ClearEngine)
            .run(Invocation::new(1, 2, ADD32, to_bits(5, 32), vec![32, 32]), io1)
            .await
    });

    assert_eq!(from_bits(&party0.await.unwrap().unwrap()), 8);
    assert_eq!(from_bits(&party1.await.unwrap().unwrap()), 8);
}
