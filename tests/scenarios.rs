//! End-to-end searches through the public API.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use u_tsp::accel::{AcceleratorRunner, HostDevice, Resource, Stage};
use u_tsp::geometry::{tour_length, City};
use u_tsp::kernel::KernelSource;
use u_tsp::problem::{identity_order, parse_tsplib};
use u_tsp::random::create_rng;
use u_tsp::search::{
    with_fallback, Backend, SearchConfig, SearchStrategy, SequentialRunner, Strategy,
};
use u_tsp::SearchError;

const SQUARE: &str = "NAME : square4
TYPE : TSP
DIMENSION : 4
EDGE_WEIGHT_TYPE : EUC_2D
NODE_COORD_SECTION
1 0 0
2 1 1
3 0 1
4 1 0
EOF
";

fn circle(n: usize) -> Vec<City> {
    (0..n)
        .map(|k| {
            let theta = 2.0 * std::f64::consts::PI * k as f64 / n as f64;
            City::new(100.0 * theta.cos(), 100.0 * theta.sin())
        })
        .collect()
}

fn backends() -> Vec<Strategy> {
    [Backend::Sequential, Backend::Host]
        .into_iter()
        .map(|backend| {
            let config = SearchConfig::default()
                .with_backend(backend)
                .with_iterations(2000)
                .with_fallback(false);
            Strategy::from_config(&config, KernelSource::bundled())
        })
        .collect()
}

#[test]
fn test_square_converges_from_every_start() {
    let cities = parse_tsplib(SQUARE).unwrap();
    let starts = [
        [0, 1, 2, 3],
        [0, 2, 1, 3],
        [3, 1, 0, 2],
        [2, 0, 3, 1],
    ];
    for strategy in backends() {
        for (seed, start) in starts.iter().enumerate() {
            let result = strategy
                .search(&cities, start, &mut create_rng(seed as u64))
                .unwrap();
            assert!(
                (result.fitness - 4.0).abs() < 1e-9,
                "{} from {start:?} ended at {}",
                strategy.name(),
                result.fitness
            );
        }
    }
}

#[test]
fn test_circle_shortens_on_both_backends() {
    let cities = circle(24);
    // every other city, then the rest: a heavily crossed tour
    let start: Vec<usize> = (0..24).step_by(2).chain((1..24).step_by(2)).collect();
    for strategy in backends() {
        let result = strategy.search(&cities, &start, &mut create_rng(5)).unwrap();
        assert!(result.fitness < result.initial_fitness, "{}", strategy.name());
        assert!((result.fitness - tour_length(&cities, &result.order)).abs() < 1e-9);
    }
}

#[test]
fn test_tiny_instances() {
    for strategy in backends() {
        let one = [City::new(3.0, 4.0)];
        let result = strategy.search(&one, &[0], &mut create_rng(1)).unwrap();
        assert_eq!(result.order, vec![0]);
        assert_eq!(result.fitness, 0.0);

        let two = [City::new(0.0, 0.0), City::new(3.0, 4.0)];
        let result = strategy.search(&two, &[1, 0], &mut create_rng(1)).unwrap();
        assert!((result.fitness - 10.0).abs() < 1e-12);
    }
}

#[test]
fn test_rejects_bad_input_on_both_backends() {
    let cities = parse_tsplib(SQUARE).unwrap();
    for strategy in backends() {
        for order in [&[0, 1, 2][..], &[0, 1, 1, 2], &[0, 1, 2, 4], &[]] {
            let err = strategy
                .search(&cities, order, &mut create_rng(1))
                .unwrap_err();
            assert!(matches!(err, SearchError::InvalidInput(_)), "{order:?}");
        }
        assert!(strategy.search(&[], &[], &mut create_rng(1)).is_err());
    }
}

#[test]
fn test_device_failure_falls_back_to_sequential() {
    let cities = parse_tsplib(SQUARE).unwrap();
    let config = SearchConfig::default().with_iterations(2000);
    let device = HostDevice::new().with_fault(Stage::Dispatch);
    let ledger = device.ledger().clone();
    let accelerator = AcceleratorRunner::new(device, KernelSource::bundled(), config.clone());
    let fallback = SequentialRunner::new(config);

    let result = with_fallback(
        &accelerator,
        Some(&fallback),
        &cities,
        &identity_order(4),
        &mut create_rng(2),
        None,
    )
    .unwrap();

    assert_eq!(result.backend, "sequential");
    assert!((result.fitness - 4.0).abs() < 1e-9);
    assert!(ledger.live().is_empty());
    assert!(ledger.acquired().contains(&Resource::Kernel));
}

#[test]
fn test_pre_cancelled_search_keeps_initial_order() {
    let cities = circle(10);
    let start = vec![0, 5, 1, 6, 2, 7, 3, 8, 4, 9];
    let cancel = Arc::new(AtomicBool::new(true));
    for strategy in backends() {
        let result = strategy
            .search_with_cancel(&cities, &start, &mut create_rng(1), Some(cancel.clone()))
            .unwrap();
        assert!(result.cancelled);
        assert_eq!(result.order, start);
    }
}
