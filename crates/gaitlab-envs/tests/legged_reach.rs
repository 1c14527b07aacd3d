use gaitlab::curriculum::{Cell, Curriculum, CurriculumConfig};
use gaitlab::env::LeggedEnv;
use gaitlab::vector::{ChunkedVecEnv, VecEnvConfig};
use gaitlab_envs::{LeggedReach, NUM_LEG_CONFIGS};
use ndarray::{array, Array1, Array2};

/// Velocity command that lands exactly on the target once it is within reach
fn greedy(obs: &Array1<f32>) -> Array1<f32> {
    let speed = 0.05 * (obs[4] + obs[5]);
    array![
        (obs[2] / speed).clamp(-1.0, 1.0),
        (obs[3] / speed).clamp(-1.0, 1.0)
    ]
}

#[test]
fn test_greedy_policy_succeeds() {
    let mut env = LeggedReach::new();
    env.set_curriculum_cells(&[vec![Cell::new(1, 2)]]);
    let (mut obs, _) = env.reset(Some(3)).unwrap();

    for _ in 0..200 {
        let result = env.step(greedy(&obs).view()).unwrap();
        let done = result.done();
        obs = result.observation.clone();
        if done {
            assert!(result.terminated);
            let summary = result.info.episode.expect("episode summary on the final step");
            assert_eq!(summary.curriculum.cell, Cell::new(1, 2));
            assert_eq!(summary.curriculum.score, 1.0);
            assert_eq!(summary.reward("success"), Some(1.0));
            assert!(summary.reward("progress").unwrap() > 0.0);
            assert!(summary.reward("energy").unwrap() < 0.0);
            return;
        }
    }
    panic!("greedy policy never reached the target");
}

#[test]
fn test_idle_policy_truncates_with_zero_score() {
    let mut env = LeggedReach::new();
    env.reset(Some(0)).unwrap();

    let idle = Array1::zeros(2);
    for step in 1..=200 {
        let result = env.step(idle.view()).unwrap();
        assert!(!result.terminated);
        if step < 200 {
            assert!(!result.truncated);
            assert!(result.info.episode.is_none());
        } else {
            assert!(result.truncated);
            let summary = result.info.episode.unwrap();
            assert_eq!(summary.curriculum.score, 0.0);
            assert_eq!(summary.reward("progress"), Some(0.0));
        }
    }
}

#[test]
fn test_episodes_stay_within_their_design() {
    let probe = LeggedReach::new();
    let (low, high) = probe.leg_param_bounds();
    let config = CurriculumConfig {
        num_designs: 4,
        ..Default::default()
    };
    let curriculum = Curriculum::initialize(
        probe.leg_params().view(),
        low.view(),
        high.view(),
        probe.curriculum_score_th(),
        &config,
    )
    .unwrap();
    assert_eq!(curriculum.designs().labels.len(), NUM_LEG_CONFIGS);

    let mut env = LeggedReach::new();
    env.set_curriculum_designs(curriculum.designs());
    env.set_curriculum_cells(&curriculum.cells());

    for seed in 0..20 {
        let (obs, _) = env.reset(Some(seed)).unwrap();
        let design = env.design();
        assert!(design < 4);

        // The leg parameters in the observation belong to a member of the design
        let params = probe.leg_params();
        let member = params.rows().into_iter().enumerate().any(|(i, row)| {
            curriculum.designs().labels[i] == design && row.iter().eq(obs.slice(ndarray::s![4..]).iter())
        });
        assert!(member);
    }
}

#[test]
fn test_runs_inside_chunked_engine() {
    let config = VecEnvConfig::new(2, 3);
    let mut envs = ChunkedVecEnv::new(LeggedReach::new, config).unwrap();
    assert_eq!(envs.num_envs(), 6);
    assert_eq!(envs.observation_size(), 8);
    assert_eq!(envs.action_size(), 2);

    let probe = envs.probe();
    let (low, high) = probe.leg_param_bounds();
    let curriculum = Curriculum::initialize(
        probe.leg_params().view(),
        low.view(),
        high.view(),
        probe.curriculum_score_th(),
        &CurriculumConfig::default(),
    )
    .unwrap();
    envs.restore_workers(curriculum.designs(), None).unwrap();
    envs.sync_curriculum(&curriculum.cells());

    let obs = envs.reset(Some(0)).unwrap();
    assert_eq!(obs.dim(), (6, 8));

    let result = envs.step(&Array2::zeros((6, 2))).unwrap();
    assert_eq!(result.observations.dim(), (6, 8));
    assert!(result.rewards.iter().all(|r| r.is_finite()));
}
