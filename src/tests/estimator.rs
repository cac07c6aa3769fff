use rstest::rstest;

use crate::{
    prelude::{
        Config, Covariance, Error, Estimator2D, Measurements, Point2, RadioSource, Reading2D,
        RobustMethod, Targets,
    },
    tests::{access_point, init_logger, Recorder, Scenario, TRANSMITTED_POWER_DBM},
};

fn ranging_readings(size: usize) -> Vec<Reading2D> {
    Scenario::<2>::new(0, size, 20.0).ranging(0.0)
}

#[test]
fn config_rejection() {
    init_logger();

    let mut estimator = Estimator2D::ranging(Config::default()).unwrap();
    assert_eq!(estimator.min_readings(), 3);

    for (cfg, error) in [
        (
            Config::default().with_threshold(0.0),
            Error::InvalidThreshold,
        ),
        (
            Config::default().with_confidence(1.0),
            Error::InvalidConfidence,
        ),
        (
            Config::default().with_max_iterations(0),
            Error::InvalidMaxIterations,
        ),
        (
            Config::default().with_progress_delta(1.5),
            Error::InvalidProgressDelta,
        ),
        (
            Config::default().with_preliminary_subset_size(2),
            Error::PreliminarySubsetTooSmall(2, 3),
        ),
    ] {
        assert!(error.is_illegal_argument());
        assert_eq!(estimator.set_config(cfg), Err(error));
        assert_eq!(estimator.config(), &Config::default());
    }

    let cfg = Config::with_method(RobustMethod::MSAC).with_preliminary_subset_size(5);
    estimator.set_config(cfg.clone()).unwrap();
    assert_eq!(estimator.config(), &cfg);

    // nothing to estimate
    let targets = Targets {
        position: false,
        transmitted_power: false,
        path_loss_exponent: false,
    };
    assert!(matches!(
        Estimator2D::rssi(Config::default(), targets),
        Err(Error::NoEstimationTarget)
    ));

    // ranging only ever resolves the position
    estimator.set_targets(Targets::all()).unwrap();
    assert_eq!(estimator.targets(), Targets::position_only());
}

#[test]
fn readings_validation() {
    init_logger();

    let mut estimator = Estimator2D::ranging(Config::default()).unwrap();

    assert_eq!(
        estimator.set_readings(ranging_readings(2)),
        Err(Error::NotEnoughReadings(2, 3))
    );

    let mut readings = ranging_readings(5);
    readings[3] = Reading2D::rssi(access_point(), Point2::new(1.0, 1.0), -50.0);
    assert_eq!(
        estimator.set_readings(readings),
        Err(Error::MissingDistance(3))
    );

    let mut readings = ranging_readings(5);
    readings[1].source = RadioSource::wifi_access_point("66:77:88:99:aa:bb", 2_412_000_000);
    assert_eq!(
        estimator.set_readings(readings),
        Err(Error::MixedRadioSources)
    );

    assert!(estimator.readings().is_empty());
    assert!(!estimator.is_ready());

    estimator.set_readings(ranging_readings(5)).unwrap();
    assert_eq!(estimator.readings().len(), 5);
    assert!(estimator.is_ready());
}

#[test]
fn quality_scores_readiness() {
    init_logger();

    let mut estimator = Estimator2D::ranging(Config::with_method(RobustMethod::PROSAC)).unwrap();
    estimator.set_readings(ranging_readings(10)).unwrap();
    assert!(!estimator.is_ready());
    assert_eq!(estimator.estimate(), Err(Error::NotReady));
    assert!(!Error::NotReady.is_illegal_argument());

    assert_eq!(
        estimator.set_quality_scores(vec![1.0; 2]),
        Err(Error::QualityScoresLength)
    );

    let mut scores = vec![1.0; 10];
    scores[4] = f64::NAN;
    assert_eq!(
        estimator.set_quality_scores(scores),
        Err(Error::QualityScoresLength)
    );
    assert!(estimator.quality_scores().is_none());

    // one score per reading
    assert_eq!(
        estimator.set_quality_scores(vec![1.0; 5]),
        Err(Error::QualityScoresLength)
    );
    assert_eq!(
        estimator.set_quality_scores(vec![1.0; 11]),
        Err(Error::QualityScoresLength)
    );
    assert!(estimator.quality_scores().is_none());

    estimator.set_quality_scores(vec![1.0; 10]).unwrap();
    assert!(estimator.is_ready());

    // a rejection keeps the previous scores
    assert_eq!(
        estimator.set_quality_scores(vec![0.5; 9]),
        Err(Error::QualityScoresLength)
    );
    assert_eq!(estimator.quality_scores(), Some(&[1.0; 10][..]));

    // new readings: previous scores no longer match
    estimator.set_readings(ranging_readings(12)).unwrap();
    assert!(!estimator.is_ready());
    estimator.set_quality_scores(vec![1.0; 12]).unwrap();
    assert!(estimator.is_ready());

    // without readings, only the minimal length applies
    let mut estimator = Estimator2D::ranging(Config::with_method(RobustMethod::PROMedS)).unwrap();
    estimator.set_quality_scores(vec![1.0; 7]).unwrap();
    assert_eq!(estimator.quality_scores().map(|s| s.len()), Some(7));

    // quality scores are ignored by other methods
    let mut estimator = Estimator2D::ranging(Config::default()).unwrap();
    estimator.set_quality_scores(vec![1.0]).unwrap();
    assert!(estimator.quality_scores().is_none());
}

#[test]
fn rssi_readiness() {
    init_logger();

    let mut scenario = Scenario::<2>::new(1, 10, 20.0);
    let readings = scenario.rssi(TRANSMITTED_POWER_DBM, 2.0, 0.0);

    // transmitted power at a known position
    let targets = Targets::default().with_position(false);
    let mut estimator = Estimator2D::rssi(Config::default(), targets).unwrap();
    assert_eq!(estimator.measurements(), Measurements::Rssi);
    assert_eq!(estimator.min_readings(), 2);

    estimator.set_readings(readings.clone()).unwrap();
    assert!(!estimator.is_ready());

    assert_eq!(
        estimator.set_initial_position(Some(Point2::new(f64::NAN, 0.0))),
        Err(Error::InvalidInitialValue)
    );

    estimator
        .set_initial_position(Some(scenario.source))
        .unwrap();
    assert!(estimator.is_ready());

    // position only: the transmitted power must be known
    let mut estimator = Estimator2D::rssi(Config::default(), Targets::position_only()).unwrap();
    assert_eq!(estimator.min_readings(), 3);

    estimator.set_readings(readings).unwrap();
    assert!(!estimator.is_ready());

    assert_eq!(
        estimator.set_initial_transmitted_power_dbm(Some(f64::INFINITY)),
        Err(Error::InvalidInitialValue)
    );

    estimator
        .set_initial_transmitted_power_dbm(Some(TRANSMITTED_POWER_DBM))
        .unwrap();
    assert!(estimator.is_ready());

    assert_eq!(
        Estimator2D::rssi(Config::default(), Targets::all())
            .unwrap()
            .min_readings(),
        5
    );
}

#[test]
fn listener_and_lock() {
    init_logger();

    let mut scenario = Scenario::<2>::located(3, 80, 50.0, Point2::new(12.3, -7.8)).with_outliers(0.2);
    let readings = scenario.ranging(0.0);

    let cfg = Config::with_method(RobustMethod::LMedS)
        .with_refinement(false)
        .with_seed(5);

    let mut estimator = Estimator2D::ranging(cfg.clone()).unwrap();

    let (recorder, record) = Recorder::new();
    estimator.set_listener(Some(recorder)).unwrap();
    estimator.set_readings(readings).unwrap();

    let estimate = estimator.estimate().unwrap();
    assert!(!estimator.is_locked());

    assert!((estimate.position - scenario.source).norm() < 1e-6);
    assert_eq!(estimate.covariance, Covariance::NotRequested);
    assert!(!estimate.refined);
    assert!(estimate.transmitted_power_dbm.is_none());
    assert!(estimate.path_loss_exponent.is_none());

    // outliers are at least 1m off
    for (inlier, outlier) in estimate.inliers.inliers.iter().zip(scenario.outliers.iter()) {
        assert_eq!(*inlier, !outlier);
    }
    assert_eq!(
        estimate.inliers.num_inliers,
        80 - scenario.num_outliers()
    );
    assert!(estimate.inliers.best_median.is_some());

    {
        let record = record.borrow();
        assert_eq!(record.start, 1);
        assert_eq!(record.end, 1);
        assert_eq!(record.unlocked, 0);

        let expected = (1..=record.iterations.len()).collect::<Vec<_>>();
        assert_eq!(record.iterations, expected);

        for progress in record.progress.iter() {
            assert!((0.0..=1.0).contains(progress));
        }
        for pair in record.progress.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    assert_eq!(estimator.estimated_position(), Some(estimate.position));
    assert_eq!(estimator.inliers_data(), Some(&estimate.inliers));

    // collinear sensors: no candidate can be solved
    let collinear = (0..10)
        .map(|i| {
            let sensor = Point2::new(i as f64, 0.0);
            Reading2D::ranging(access_point(), sensor, (sensor - scenario.source).norm())
        })
        .collect::<Vec<_>>();

    estimator
        .set_config(cfg.with_max_iterations(20))
        .unwrap();
    estimator.set_readings(collinear).unwrap();

    assert_eq!(estimator.estimate(), Err(Error::RobustEstimation));
    assert!(!estimator.is_locked());

    // previous result is preserved
    assert_eq!(estimator.result(), Some(&estimate));

    let record = record.borrow();
    assert_eq!(record.start, 2);
    assert_eq!(record.end, 2);
    assert_eq!(record.unlocked, 0);
}

#[test]
fn seeded_estimations_are_reproducible() {
    init_logger();

    let mut scenario = Scenario::<2>::new(8, 40, 30.0).with_outliers(0.3);
    let readings = scenario
        .ranging(0.05)
        .into_iter()
        .map(|r| r.with_distance_std_dev(0.05))
        .collect::<Vec<_>>();

    let cfg = Config::with_method(RobustMethod::MSAC)
        .with_threshold(0.3)
        .with_seed(9);

    let mut estimator = Estimator2D::ranging(cfg).unwrap();
    estimator.set_readings(readings).unwrap();

    let first = estimator.estimate().unwrap();
    let second = estimator.estimate().unwrap();

    assert_eq!(first, second);
    assert!(first.refined);
    assert!((first.position - scenario.source).norm() < 0.2);
}

#[test]
fn oversized_subsets_not_ready() {
    init_logger();

    let cfg = Config::default().with_preliminary_subset_size(6);

    let mut estimator = Estimator2D::ranging(cfg).unwrap();
    estimator.set_readings(ranging_readings(5)).unwrap();

    assert!(!estimator.is_ready());
    assert_eq!(estimator.estimate(), Err(Error::NotReady));
    assert!(estimator.result().is_none());

    estimator.set_readings(ranging_readings(6)).unwrap();
    assert!(estimator.is_ready());
    assert!(estimator.estimate().is_ok());
}

#[test]
fn unrefined_fallback_covariance() {
    init_logger();

    let mut scenario = Scenario::<2>::new(21, 30, 30.0);
    let readings = scenario
        .ranging(0.5)
        .into_iter()
        .map(|r| r.with_distance_std_dev(0.5))
        .collect::<Vec<_>>();

    // overdetermined subsets on noisy ranges: nothing fits within 1e-9
    let cfg = Config::with_method(RobustMethod::RANSAC)
        .with_preliminary_subset_size(6)
        .with_threshold(1e-9)
        .with_max_iterations(10)
        .with_seed(4);

    let mut estimator = Estimator2D::ranging(cfg.clone()).unwrap();
    estimator.set_readings(readings).unwrap();

    let estimate = estimator.estimate().unwrap();
    assert_eq!(estimate.inliers.num_inliers, 0);
    assert!(!estimate.refined);
    assert_eq!(estimate.covariance, Covariance::Unavailable);
    assert!(estimate.position_covariance().is_none());
    assert!(estimator.estimated_covariance().is_none());

    estimator.set_config(cfg.with_covariance(false)).unwrap();

    let estimate = estimator.estimate().unwrap();
    assert!(!estimate.refined);
    assert_eq!(estimate.covariance, Covariance::NotRequested);
}

#[rstest]
#[case(3, 4)]
#[case(4, 6)]
fn progressive_small_sets_stop_early(#[case] size: usize, #[case] seed: u64) {
    init_logger();

    let mut scenario = Scenario::<2>::new(seed, size, 20.0);
    let readings = scenario.ranging(0.0);
    let scores = scenario.quality_scores();

    let cfg = Config::with_method(RobustMethod::PROSAC).with_seed(seed);

    let mut estimator = Estimator2D::ranging(cfg).unwrap();

    let (recorder, record) = Recorder::new();
    estimator.set_listener(Some(recorder)).unwrap();
    estimator.set_readings(readings).unwrap();
    estimator.set_quality_scores(scores).unwrap();

    let estimate = estimator.estimate().unwrap();
    assert!((estimate.position - scenario.source).norm() < 1e-6);
    assert_eq!(estimate.inliers.num_inliers, size);

    let record = record.borrow();
    assert_eq!(record.iterations, vec![1]);
    assert_eq!(record.progress.last(), Some(&1.0));
}
