#![allow(clippy::cast_possible_truncation)]
use approx::assert_abs_diff_eq;
use velopix_algorithms::{
    reconstruct_events, Algorithm, GraphDfs, GraphDfsConfig, ReconstructionAlgorithm,
    SearchByTripletTrie, TrackFollowing,
};
use velopix_core::{Error, Event, EventMetricsCalculator, Hit, ParamValue, TruthTrack};

/// Straight lines `(x0, tx)` crossing `modules` layers spaced 10 apart.
fn lines_event(lines: &[(f64, f64)], modules: u16) -> Event {
    let mut hits = Vec::new();
    let mut truth = Vec::new();
    for (n, &(x0, tx)) in lines.iter().enumerate() {
        let first = (n as u32) * 100;
        for m in 0..modules {
            let z = f64::from(m) * 10.0;
            hits.push(Hit::new(first + u32::from(m), x0 + tx * z, 0.5 * n as f64, z, m));
        }
        truth.push(TruthTrack::new(n as u32, (0..u32::from(modules)).map(|k| first + k)));
    }
    Event::new(hits, Some(truth)).unwrap()
}

fn three_lines() -> Event {
    lines_event(&[(-20.0, 0.01), (0.0, -0.01), (20.0, 0.02)], 6)
}

#[test]
fn test_three_hit_line_found_by_every_algorithm() {
    let event = lines_event(&[(0.0, 0.0)], 3);
    let calc = EventMetricsCalculator::new();
    for algorithm in Algorithm::ALL {
        let params = algorithm.schema().defaults();
        let tracks = algorithm.reconstruct(&event, &params).unwrap();
        let report = calc.compute_event(&event, &tracks).unwrap();
        assert_abs_diff_eq!(report.efficiency, 1.0);
        assert_abs_diff_eq!(report.ghost_rate, 0.0);
    }
}

#[test]
fn test_separated_lines_reconstructed() {
    let event = three_lines();
    let calc = EventMetricsCalculator::new();
    for algorithm in Algorithm::ALL {
        let params = algorithm.schema().defaults();
        let tracks = algorithm.reconstruct(&event, &params).unwrap();
        assert_eq!(tracks.len(), 3, "{algorithm} found {} tracks", tracks.len());
        let report = calc.compute_event(&event, &tracks).unwrap();
        assert_abs_diff_eq!(report.efficiency, 1.0);
        assert_abs_diff_eq!(report.clone_rate, 0.0);
        assert_abs_diff_eq!(report.hit_purity, 1.0);
    }
}

#[test]
fn test_full_detector_tracks_with_defaults() {
    let calc = EventMetricsCalculator::new();
    for event in [
        lines_event(&[(0.5, 0.01)], 52),
        lines_event(&[(-20.0, 0.01), (0.0, -0.01), (20.0, 0.02)], 52),
    ] {
        for algorithm in Algorithm::ALL {
            let params = algorithm.schema().defaults();
            let tracks = algorithm.reconstruct(&event, &params).unwrap();
            assert!(
                tracks.iter().all(|t| t.len() == 52),
                "{algorithm} split a 52-layer track"
            );
            let report = calc.compute_event(&event, &tracks).unwrap();
            assert_abs_diff_eq!(report.efficiency, 1.0);
            assert_abs_diff_eq!(report.ghost_rate, 0.0);
        }
    }
}

#[test]
fn test_reconstruction_is_deterministic() {
    let event = three_lines();
    for algorithm in Algorithm::ALL {
        let params = algorithm.schema().defaults();
        let first = algorithm.reconstruct(&event, &params).unwrap();
        for _ in 0..3 {
            assert_eq!(algorithm.reconstruct(&event, &params).unwrap(), first);
        }
    }
}

#[test]
fn test_exclusive_algorithms_never_share_hits() {
    // Dense band where many candidates compete for the same hits.
    let mut hits = Vec::new();
    for m in 0..5u16 {
        for k in 0..4u32 {
            let z = f64::from(m) * 10.0;
            let id = u32::from(m) * 10 + k;
            hits.push(Hit::new(id, f64::from(k) * 0.3, 0.0, z, m));
        }
    }
    let event = Event::new(hits, None).unwrap();

    let tf = TrackFollowing::new();
    let tracks = tf.reconstruct(&event, &tf.schema().defaults()).unwrap();
    assert!(tracks.exclusive);
    assert!(!tracks.has_shared_hits());

    let sbt = SearchByTripletTrie::new();
    let tracks = sbt.reconstruct(&event, &sbt.schema().defaults()).unwrap();
    assert!(tracks.exclusive);
    assert!(!tracks.has_shared_hits());

    let dfs = GraphDfs::new();
    let tracks = dfs.reconstruct(&event, &dfs.schema().defaults()).unwrap();
    assert!(tracks.exclusive);
    assert!(!tracks.has_shared_hits());
}

#[test]
fn test_graph_dfs_declares_sharing() {
    let event = three_lines();
    let dfs = GraphDfs::new();
    let params = GraphDfsConfig::default().with_shared_hits(true).to_params();
    assert!(dfs.shares_hits(&params).unwrap());
    let tracks = dfs.reconstruct(&event, &params).unwrap();
    assert!(!tracks.exclusive);
}

#[test]
fn test_empty_event_rejected() {
    let event = Event::new(Vec::new(), None).unwrap();
    for algorithm in Algorithm::ALL {
        let params = algorithm.schema().defaults();
        assert!(matches!(
            algorithm.reconstruct(&event, &params),
            Err(Error::EmptyEvent { hits: 0, .. })
        ));
    }
}

#[test]
fn test_invalid_parameters_rejected() {
    let event = three_lines();
    for algorithm in Algorithm::ALL {
        let mut params = algorithm.schema().defaults();
        params.insert("not_a_parameter", ParamValue::Float(1.0));
        assert!(matches!(
            algorithm.reconstruct(&event, &params),
            Err(Error::InvalidParameter { .. })
        ));
    }
}

#[test]
fn test_parameters_checked_before_hit_count() {
    let event = Event::new(vec![Hit::new(0, 0.0, 0.0, 0.0, 0)], None).unwrap();
    for algorithm in Algorithm::ALL {
        let mut params = algorithm.schema().defaults();
        params.insert("min_track_length", ParamValue::Int(-1));
        assert!(matches!(
            algorithm.reconstruct(&event, &params),
            Err(Error::InvalidParameter { .. })
        ));
        assert!(matches!(
            algorithm.reconstruct(&event, &algorithm.schema().defaults()),
            Err(Error::EmptyEvent { hits: 1, .. })
        ));
    }
}

#[test]
fn test_batch_matches_sequential() {
    let events: Vec<Event> = (0..6)
        .map(|n| lines_event(&[(-20.0, 0.01 * f64::from(n)), (20.0, 0.0)], 4 + n as u16))
        .collect();
    for algorithm in Algorithm::ALL {
        let params = algorithm.schema().defaults();
        let batch = reconstruct_events(&algorithm, &events, &params).unwrap();
        let sequential: Vec<_> = events
            .iter()
            .map(|event| algorithm.reconstruct(event, &params).unwrap())
            .collect();
        assert_eq!(batch, sequential);
    }
}
