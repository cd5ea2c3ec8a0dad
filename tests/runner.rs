use std::sync::Arc;
use std::time::Duration;

use mpcio::channel::Channel;
use mpcio::cleartext::ClearEngine;
use mpcio::runner::{Invocation, Mode, Runner, RunError, simulate};
use mpcio::transport::memory::MemoryChannel;
use mpcio_test_utils::{ADD32, ADD32X3, from_bits, to_bits};

fn sums(outputs: &[Vec<u8>]) -> Vec<u32> {
    outputs.iter().map(|bits| from_bits(bits)).collect()
}

#[tokio::test]
async fn two_parties_add_their_inputs() {
    let inputs = vec![to_bits(3, 32), to_bits(5, 32)];
    let outputs = simulate(Arc::new(ClearEngine), ADD32, &inputs, Mode::TwoParty)
        .await
        .unwrap();
    assert_eq!(sums(&outputs), vec![8, 8]);
}

#[tokio::test]
async fn automatic_mode_selection_matches_the_two_party_run() {
    let inputs = vec![to_bits(3, 32), to_bits(5, 32)];
    let outputs = simulate(Arc::new(ClearEngine), ADD32, &inputs, Mode::Auto)
        .await
        .unwrap();
    assert_eq!(sums(&outputs), vec![8, 8]);
}

#[tokio::test]
async fn forcing_the_general_path_for_two_parties_gives_the_same_result() {
    let inputs = vec![to_bits(3, 32), to_bits(5, 32)];
    let outputs = simulate(Arc::new(ClearEngine), ADD32, &inputs, Mode::Multi)
        .await
        .unwrap();
    assert_eq!(sums(&outputs), vec![8, 8]);
}

#[tokio::test]
async fn five_parties_with_three_empty_inputs_all_resolve_the_sum() {
    let inputs = vec![
        to_bits(3, 32),
        to_bits(5, 32),
        Vec::new(),
        Vec::new(),
        Vec::new(),
    ];
    let outputs = simulate(Arc::new(ClearEngine), ADD32, &inputs, Mode::Auto)
        .await
        .unwrap();
    assert_eq!(sums(&outputs), vec![8, 8, 8, 8, 8]);
}

#[tokio::test]
async fn three_parties_add_through_the_ternary_circuit() {
    let inputs = vec![to_bits(10, 32), to_bits(20, 32), to_bits(12, 32)];
    let outputs = simulate(Arc::new(ClearEngine), ADD32X3, &inputs, Mode::Auto)
        .await
        .unwrap();
    assert_eq!(sums(&outputs), vec![42, 42, 42]);
}

#[tokio::test]
async fn two_party_mode_rejects_other_sizes() {
    let inputs = vec![to_bits(1, 32), to_bits(2, 32), to_bits(3, 32)];
    let err = simulate(Arc::new(ClearEngine), ADD32X3, &inputs, Mode::TwoParty)
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Engine(_)), "got {err:?}");
}

#[tokio::test]
async fn a_second_run_fails_fast_and_leaves_the_first_untouched() {
    let mut channels = MemoryChannel::channels(2);
    let io = channels.remove(0);
    let io_handle = io.clone();
    let runner = Arc::new(Runner::new(ClearEngine));

    // The peer never shows up, so the first run parks in its receive.
    let first = tokio::spawn({
        let runner = Arc::clone(&runner);
        let invocation = Invocation::new(0, 2, ADD32, to_bits(3, 32), vec![32, 32]);
        async move { runner.run(invocation, io).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = runner
        .run(
            Invocation::new(0, 2, ADD32, to_bits(3, 32), vec![32, 32]),
            channels.remove(0),
        )
        .await;
    assert_eq!(second.unwrap_err(), RunError::Busy);

    // The first run is still in flight, and settles once its channel closes.
    assert!(!first.is_finished());
    io_handle.close();
    let settled = first.await.unwrap();
    assert!(matches!(settled, Err(RunError::Engine(_))), "got {settled:?}");
}

#[tokio::test]
async fn closing_the_channel_settles_a_run_instead_of_hanging() {
    let mut channels = MemoryChannel::channels(2);
    let io = channels.remove(0);
    let io_handle = io.clone();
    let runner = Runner::new(ClearEngine);

    let run = tokio::spawn(async move {
        runner
            .run(Invocation::new(0, 2, ADD32, to_bits(3, 32), vec![32, 32]), io)
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    io_handle.close();

    let settled = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run must settle, not hang")
        .unwrap();
    assert!(settled.is_err());
}

#[tokio::test]
async fn the_runner_is_reusable_after_a_settled_run() {
    let runner = Arc::new(Runner::new(ClearEngine));
    for _ in 0..2 {
        let channels = MemoryChannel::channels(2);
        let mut parties = Vec::new();
        for (party, io) in channels.into_iter().enumerate() {
            // Distinct runners per party, except party 0 reuses the same one
            // across iterations.
            let runner = if party == 0 {
                Arc::clone(&runner)
            } else {
                Arc::new(Runner::new(ClearEngine))
            };
            let input = to_bits((party as u32 + 1) * 3, 32);
            let invocation = Invocation::new(party, 2, ADD32, input, vec![32, 32]);
            parties.push(tokio::spawn(async move { runner.run(invocation, io).await }));
        }
        for party in parties {
            let bits = party.await.unwrap().unwrap();
            assert_eq!(from_bits(&bits), 9);
        }
    }
}

#[tokio::test]
async fn invalid_invocations_fail_before_anything_starts() {
    let mut channels = MemoryChannel::channels(2);
    let runner = Runner::new(ClearEngine);

    let err = runner
        .run(
            Invocation::new(2, 2, ADD32, to_bits(0, 32), vec![32, 32]),
            channels.remove(0),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::InvalidInvocation(_)), "got {err:?}");

    let err = runner
        .run(
            Invocation::new(0, 2, ADD32, to_bits(0, 32), vec![32, 32, 32]),
            channels.remove(0),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::InvalidInvocation(_)), "got {err:?}");
}

#[tokio::test]
async fn a_broken_circuit_reports_an_engine_failure() {
    let inputs = vec![to_bits(3, 32), to_bits(5, 32)];
    let err = simulate(Arc::new(ClearEngine), "not a circuit", &inputs, Mode::Auto)
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Engine(_)), "got {err:?}");
}

#[tokio::test]
async fn preflight_probes_do_not_disturb_the_protocol() {
    let channels = MemoryChannel::channels(2);
    let mut parties = Vec::new();
    for (party, io) in channels.into_iter().enumerate() {
        let input = to_bits(if party == 0 { 3 } else { 5 }, 32);
        let mut invocation = Invocation::new(party, 2, ADD32, input, vec![32, 32]);
        invocation.preflight = true;
        let runner = Runner::new(ClearEngine);
        parties.push(tokio::spawn(async move { runner.run(invocation, io).await }));
    }
    for party in parties {
        assert_eq!(from_bits(&party.await.unwrap().unwrap()), 8);
    }
}
