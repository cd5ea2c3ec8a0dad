use futures::FutureExt;
use mpcio::queue::{ByteQueue, QueueError};

#[test]
fn pop_is_immediate_when_enough_bytes_are_buffered() {
    let queue = ByteQueue::new();
    queue.push(&[1, 2, 3, 4, 5]).unwrap();
    let bytes = queue.pop(3).now_or_never().unwrap().unwrap();
    assert_eq!(bytes, vec![1, 2, 3]);
    assert_eq!(queue.unread(), 2);
}

#[test]
fn pop_waits_until_enough_bytes_arrive() {
    let queue = ByteQueue::new();
    let mut pending = queue.pop(4);
    assert!((&mut pending).now_or_never().is_none());

    queue.push(&[1, 2]).unwrap();
    assert!((&mut pending).now_or_never().is_none());
    assert_eq!(queue.unread(), 2);

    queue.push(&[3, 4, 5]).unwrap();
    let bytes = pending.now_or_never().unwrap().unwrap();
    assert_eq!(bytes, vec![1, 2, 3, 4]);
    assert_eq!(queue.unread(), 1);
}

#[test]
fn reads_are_served_in_request_order_never_by_size() {
    let queue = ByteQueue::new();
    queue.push(&[0; 10]).unwrap();

    let mut large = queue.pop(100);
    // 10 bytes would satisfy the small read, but the large one came first.
    let mut small = queue.pop(5);
    assert!((&mut large).now_or_never().is_none());
    assert!((&mut small).now_or_never().is_none());

    let tail: Vec<u8> = (0..95).collect();
    queue.push(&tail).unwrap();
    let first = large.now_or_never().unwrap().unwrap();
    let second = small.now_or_never().unwrap().unwrap();
    assert_eq!(first.len(), 100);
    assert_eq!(&first[10..], &tail[..90]);
    assert_eq!(second, &tail[90..]);
    assert_eq!(queue.unread(), 0);
}

#[test]
fn zero_length_pop_still_queues_behind_earlier_reads() {
    let queue = ByteQueue::new();
    let empty = queue.pop(0).now_or_never().unwrap().unwrap();
    assert!(empty.is_empty());

    let mut blocked = queue.pop(3);
    let mut empty_after = queue.pop(0);
    assert!((&mut empty_after).now_or_never().is_none());
    queue.push(&[7, 8, 9]).unwrap();
    assert_eq!(blocked.now_or_never().unwrap().unwrap(), vec![7, 8, 9]);
    assert!(empty_after.now_or_never().unwrap().unwrap().is_empty());
}

#[test]
fn bytes_flow_through_in_push_order_across_chunk_boundaries() {
    let queue = ByteQueue::new();
    let stream: Vec<u8> = (0..=255).cycle().take(10_000).map(|b: u16| b as u8).collect();
    let mut pushed = 0;
    let mut popped = Vec::new();
    for (chunk, want) in stream.chunks(499).zip([17usize, 1, 400, 0, 933].into_iter().cycle()) {
        queue.push(chunk).unwrap();
        pushed += chunk.len();
        let want = want.min(pushed - popped.len());
        popped.extend(queue.pop(want).now_or_never().unwrap().unwrap());
    }
    let rest = queue.unread();
    popped.extend(queue.pop(rest).now_or_never().unwrap().unwrap());
    assert_eq!(popped, stream);
}

#[test]
fn close_fails_pending_and_future_operations() {
    let queue = ByteQueue::new();
    queue.push(&[1, 2, 3]).unwrap();
    let pending = queue.pop(10);
    queue.close();

    assert_eq!(pending.now_or_never().unwrap(), Err(QueueError::Closed));
    // Buffered bytes are unreachable after close.
    assert_eq!(
        queue.pop(1).now_or_never().unwrap(),
        Err(QueueError::Closed)
    );
    assert_eq!(queue.push(&[4]), Err(QueueError::Closed));
}

#[test]
fn close_is_idempotent() {
    let queue = ByteQueue::new();
    queue.close();
    queue.close();
    assert!(queue.is_closed());
    assert_eq!(queue.push(&[1]), Err(QueueError::Closed));
}
