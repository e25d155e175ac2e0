//! End-to-end runs of the sequencer and monitor over in-memory backends.

use chrono::{TimeZone, Utc};
use std::sync::Arc;

use monitor::{FileResultStore, ResultStore, StoreConfig};
use sequencer::timing::TokioClock;
use simulation::backends::SteppingClock;
use simulation::server::Tamper;
use simulation::{SimConfig, Simulation};

fn config(rounds: u32) -> SimConfig {
    let mut config = SimConfig::default();
    config.scenario.seed = 1234;
    config.scenario.rounds = rounds;
    config.scenario.batch_size = 12;
    config
}

#[tokio::test]
async fn test_honest_run_fully_verified() {
    let mut sim = Simulation::build(config(12), SteppingClock::fixed()).unwrap();
    let report = sim.run().await.unwrap();

    assert!(report.initialized);
    assert!(report.all_verified(), "failures: {:?}", report.epochs);
    assert_eq!(report.cycle_failures, 0);
    assert_eq!(report.epochs.len() as u64, report.final_revision + 1);
    assert_eq!(report.epochs_created + report.epochs_skipped, 12);
    // Idle rounds 4 and 8 are not forced; round 12 is idle but nothing
    // earlier is left pending either.
    assert_eq!(report.epochs_skipped, 3);
    assert!(report.enqueued.total() > 0);
    assert!(report.mutations_rejected > 0);
    assert_eq!(report.cross_checks.mismatched, 0);
    assert_eq!(report.final_high_water_mark, sim.queue.len() as u64);
}

#[tokio::test]
async fn test_forced_epoch_without_mutations_verifies() {
    let mut config = config(3);
    config.scenario.idle_every = 1;
    config.scenario.force_every = 1;
    let mut sim = Simulation::build(config, SteppingClock::fixed()).unwrap();
    let report = sim.run().await.unwrap();

    assert_eq!(report.epochs_created, 3);
    assert!(report.all_verified());
    let roots: Vec<&str> = report.epochs.iter().map(|e| e.root_hash.as_str()).collect();
    assert!(roots.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(report.final_high_water_mark, 0);
}

#[tokio::test]
async fn test_forged_roots_detected() {
    let mut config = config(6);
    config.scenario.tamper_every = 2;
    config.scenario.tamper_with = Tamper::ForgeRoot;
    let mut sim = Simulation::build(config, SteppingClock::fixed()).unwrap();
    let report = sim.run().await.unwrap();

    // Rounds 1, 2, 3, 5 and 6 create epochs; the 2nd and 4th are forged.
    assert_eq!(report.epochs_created, 5);
    assert_eq!(report.epochs_failed, 2);
    for epoch in [2usize, 4] {
        let summary = &report.epochs[epoch];
        assert!(!summary.verified);
        assert!(summary
            .failures
            .iter()
            .any(|f| f.contains("map root signature invalid")));
    }
    assert!(report.epochs[3].verified);
    assert!(report.epochs[5].verified);
}

#[tokio::test]
async fn test_dropped_mutation_detected() {
    let mut config = config(4);
    config.scenario.batch_size = 1;
    config.scenario.idle_every = 0;
    config.scenario.force_every = 0;
    config.scenario.tamper_every = 2;
    config.scenario.tamper_with = Tamper::DropMutation;
    config.workload.invalid_ratio = 0.0;
    config.workload.long_key_ratio = 0.0;
    config.workload.keys = 1_000;
    let mut sim = Simulation::build(config, SteppingClock::fixed()).unwrap();
    let report = sim.run().await.unwrap();

    assert_eq!(report.epochs_created, 4);
    let failed: Vec<u64> = report
        .epochs
        .iter()
        .filter(|e| !e.verified)
        .map(|e| e.epoch)
        .collect();
    assert_eq!(failed, vec![2, 4]);
    assert!(report.epochs[2]
        .failures
        .iter()
        .any(|f| f.contains("recomputed map root differs")));
}

#[tokio::test]
async fn test_queue_faults_retried_next_round() {
    let mut config = config(6);
    config.scenario.queue_fault_every = 3;
    let mut sim = Simulation::build(config, SteppingClock::fixed()).unwrap();
    let report = sim.run().await.unwrap();

    assert_eq!(report.cycle_failures, 2);
    assert!(report.all_verified());
    assert_eq!(sim.queue.stats().rolled_back, 2);
    // Round 6's batch is still pending after its read failed.
    assert!(report.final_high_water_mark < sim.queue.len() as u64);
}

#[tokio::test]
async fn test_map_write_faults_leave_no_trace() {
    let mut config = config(6);
    config.scenario.map_fault_every = 2;
    let mut sim = Simulation::build(config, SteppingClock::fixed()).unwrap();
    let report = sim.run().await.unwrap();

    assert!(report.cycle_failures > 0);
    assert!(report.all_verified());
    assert_eq!(report.epochs_created, report.final_revision);
}

#[tokio::test]
async fn test_witness_outage_is_advisory() {
    let mut config = config(5);
    config.scenario.witness_fault_every = 2;
    config.scenario.idle_every = 0;
    let mut sim = Simulation::build(config, SteppingClock::fixed()).unwrap();
    let report = sim.run().await.unwrap();

    assert!(report.all_verified());
    assert_eq!(report.epochs_created, 5);
    assert!(report.witness_failures > 0);
    assert_eq!(
        report.witness_failures + sim.witness.published() as u64,
        report.epochs_created
    );
    assert_eq!(report.cross_checks.mismatched, 0);
}

#[tokio::test]
async fn test_file_store_keeps_results() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results").join("monitor.journal");
    let mut config = config(5);
    config.monitor.store = StoreConfig::File { path: path.clone() };

    let mut sim = Simulation::build(config, SteppingClock::fixed()).unwrap();
    let report = sim.run().await.unwrap();
    drop(sim);

    let store = FileResultStore::open(&path).unwrap();
    assert_eq!(store.latest_epoch(), report.final_revision);
    for epoch in 0..=report.final_revision {
        let result = store.get(epoch).unwrap();
        assert!(result.is_verified());
        assert!(result.response.is_none());
        let signed = result.signed_root.unwrap();
        assert_eq!(signed.root.root_hash_hex(), report.epochs[epoch as usize].root_hash);
    }
}

#[tokio::test(start_paused = true)]
async fn test_live_loop_creates_verified_epochs() {
    let mut config = config(0);
    config.sequencer.min_interval_ms = 50;
    config.sequencer.max_interval_ms = 200;
    config.live.duration_ms = 2_000;
    config.live.enqueue_every_ms = 100;
    config.live.poll_every_ms = 100;

    let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let clock = Arc::new(TokioClock::starting_at(start));
    let sim = Simulation::build(config, clock.clone()).unwrap();
    let report = sim.run_live(clock).await.unwrap();

    assert!(report.initialized);
    assert!(report.epochs_created > 0);
    assert!(report.all_verified(), "failures: {:?}", report.epochs);
    assert_eq!(report.epochs.len() as u64, report.final_revision + 1);
}
