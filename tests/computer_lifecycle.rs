//! Power-state lifecycle of computers driven through the public simulation API.

mod common;

use fleet_power_sim::sim::{PowerPolicy, PowerState, SamplingBounds, Simulation, WorkingHours};
use fleet_power_sim::stats::metric;

use common::{EDGES, POWER, QUICK_POLICY, office_model, shutdown_model};

#[test]
fn cold_start_without_requests_sleeps_after_both_timeouts() {
    let mut sim = Simulation::new(3_600.0, 1, EDGES).unwrap();
    sim.add_computer("pc", QUICK_POLICY, POWER, None).unwrap();
    let result = sim.run().unwrap();

    let pc = &result.computers[0];
    assert_eq!(pc.transitions, 2);
    assert_eq!(pc.active_secs, 60.0);
    assert_eq!(pc.idle_secs, 120.0);
    assert_eq!(pc.sleep_secs, 3_420.0);
    assert_eq!(pc.final_state, PowerState::Sleep);

    let expected_energy = 60.0 * 80.0 + 120.0 * 50.0 + 3_420.0 * 3.0;
    assert!((pc.energy_joules - expected_energy).abs() < 1e-9);
}

#[test]
fn request_in_idle_window_cancels_the_pending_sleep() {
    let mut sim = Simulation::new(300.0, 1, EDGES).unwrap();
    let pc = sim.add_computer("pc", QUICK_POLICY, POWER, None).unwrap();
    sim.inject_request(179.0, pc, Some(0.0)).unwrap();
    let result = sim.run().unwrap();

    let pc = &result.computers[0];
    assert_eq!(pc.sleep_secs, 0.0, "sleep timer should have been cancelled");
    assert_eq!(pc.transitions, 3);
    assert_eq!(pc.final_state, PowerState::Idle);
    assert_eq!(result.stats.snapshot().count(metric::WAKE_LATENCY_SECONDS), 0);
}

#[test]
fn sleeping_computer_pays_wake_latency() {
    let policy = PowerPolicy {
        wake_latency: 8.0,
        ..QUICK_POLICY
    };
    let mut sim = Simulation::new(2_000.0, 1, EDGES).unwrap();
    let pc = sim.add_computer("pc", policy, POWER, None).unwrap();
    sim.inject_request(1_000.0, pc, Some(20.0)).unwrap();
    let result = sim.run().unwrap();

    let snap = result.stats.snapshot();
    assert_eq!(snap.sum(metric::WAKE_LATENCY_SECONDS), 8.0);
    assert_eq!(snap.count(metric::REQUESTS_SERVED), 1);
    // 60 s initial burst plus latency, service and a fresh idle timeout
    assert_eq!(result.computers[0].active_secs, 60.0 + 8.0 + 20.0 + 60.0);
}

#[test]
fn computers_outside_working_hours_reject_requests() {
    let hours = WorkingHours {
        on_hour: 9,
        off_hour: 17,
        weekdays_only: false,
    };
    let mut sim = Simulation::new(12.0 * 3_600.0, 1, EDGES).unwrap();
    let pc = sim.add_computer("pc", QUICK_POLICY, POWER, Some(hours)).unwrap();
    sim.inject_request(3_600.0, pc, Some(5.0)).unwrap();
    sim.inject_request(10.0 * 3_600.0, pc, Some(5.0)).unwrap();
    let result = sim.run().unwrap();

    let pc = &result.computers[0];
    assert_eq!(pc.requests_rejected, 1);
    assert_eq!(pc.requests_served, 1);
    assert_eq!(pc.off_secs, 9.0 * 3_600.0);
}

#[test]
fn energy_equals_power_times_time_in_state() {
    let mut sim = Simulation::new(8.0 * 3_600.0, 3, EDGES).unwrap();
    for i in 0..5 {
        let pc = sim.add_computer(format!("pc{i}"), QUICK_POLICY, POWER, None).unwrap();
        sim.add_user(pc, office_model(), SamplingBounds::new(1.0, 8.0 * 3_600.0, None).unwrap())
            .unwrap();
    }
    let result = sim.run().unwrap();

    for pc in &result.computers {
        assert!((pc.total_secs() - 8.0 * 3_600.0).abs() < 1e-6);
        let expected = pc.active_secs * POWER.active_w
            + pc.idle_secs * POWER.idle_w
            + pc.sleep_secs * POWER.sleep_w
            + pc.off_secs * POWER.off_w;
        assert!(
            (pc.energy_joules - expected).abs() < 1e-6 * expected.max(1.0),
            "{}: {} vs {}",
            pc.name,
            pc.energy_joules,
            expected
        );
    }
}

#[test]
fn identical_seeds_replay_identically() {
    let run = |seed| {
        let mut sim = Simulation::new(4.0 * 3_600.0, seed, EDGES).unwrap();
        for i in 0..3 {
            let pc = sim.add_computer(format!("pc{i}"), QUICK_POLICY, POWER, None).unwrap();
            sim.add_user(pc, office_model(), SamplingBounds::default()).unwrap();
        }
        sim.run().unwrap()
    };
    let a = run(99);
    let b = run(99);
    assert_eq!(a.stats.snapshot(), b.stats.snapshot());
    assert_eq!(a.computers, b.computers);
    assert_eq!(a.events, b.events);
}

#[test]
fn user_shutdowns_are_booked_as_user_off_time() {
    let mut sim = Simulation::new(8.0 * 3_600.0, 5, EDGES).unwrap();
    for i in 0..3 {
        let pc = sim.add_computer(format!("pc{i}"), QUICK_POLICY, POWER, None).unwrap();
        sim.add_user(pc, shutdown_model(), SamplingBounds::default()).unwrap();
    }
    let result = sim.run().unwrap();

    let snap = result.stats.snapshot();
    let shutdowns: u64 = result.computers.iter().map(|pc| pc.user_shutdowns).sum();
    let off_secs: f64 = result.computers.iter().map(|pc| pc.off_secs).sum();
    assert!(shutdowns > 0);
    assert_eq!(snap.sum(metric::USER_SHUTDOWNS), shutdowns as f64);
    assert!(off_secs > 0.0);
    assert!((snap.sum(metric::USER_SHUTDOWN_SECONDS) - off_secs).abs() < 1e-6);
    assert_eq!(snap.count(metric::AUTO_SHUTDOWN_SECONDS), 0);
    for pc in &result.computers {
        assert!((pc.total_secs() - 8.0 * 3_600.0).abs() < 1e-6);
    }
}
