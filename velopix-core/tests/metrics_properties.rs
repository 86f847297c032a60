use velopix_core::{EventMetricsCalculator, HitId, Track, TrackCollection, TruthTrack};

fn truth_tracks() -> Vec<TruthTrack> {
    vec![
        TruthTrack::new(0, [1, 2, 3, 4]),
        TruthTrack::new(1, [5, 6, 7, 8]),
        TruthTrack::new(2, [9, 10, 11]),
        TruthTrack::new(3, [12, 13]),
    ]
}

fn reconstructed() -> TrackCollection {
    let tracks: Vec<Vec<u32>> = vec![
        vec![1, 2, 3, 4],
        vec![1, 2, 3],
        vec![2, 3, 4],
        vec![5, 6, 7, 20],
        vec![9, 6, 11, 21],
        vec![30, 31, 32],
    ];
    TrackCollection::new(
        tracks
            .into_iter()
            .map(|ids| ids.into_iter().map(HitId).collect::<Track>())
            .collect(),
        false,
    )
}

fn relabel(id: HitId) -> HitId {
    // Consistent bijection on the ids used above.
    HitId(1000 - id.0 * 3)
}

#[test]
fn test_rates_within_unit_interval() {
    let report = EventMetricsCalculator::new().compute(&truth_tracks(), &reconstructed());
    for rate in [report.efficiency, report.ghost_rate, report.clone_rate] {
        assert!((0.0..=1.0).contains(&rate), "rate {rate} out of range");
    }
    // Truth 0 is matched three times: two clones.
    assert_eq!(report.counts.clones, 2);
    assert_eq!(report.counts.ghosts, 2);
}

#[test]
fn test_metrics_invariant_under_hit_relabeling() {
    let calc = EventMetricsCalculator::new();
    let baseline = calc.compute(&truth_tracks(), &reconstructed());

    let truth: Vec<TruthTrack> = truth_tracks()
        .into_iter()
        .map(|t| TruthTrack {
            id: t.id,
            hits: t.hits.into_iter().map(relabel).collect(),
        })
        .collect();
    let reco = TrackCollection::new(
        reconstructed()
            .tracks
            .into_iter()
            .map(|t| t.hits.into_iter().map(relabel).collect())
            .collect(),
        false,
    );

    assert_eq!(calc.compute(&truth, &reco), baseline);
}

#[test]
fn test_compute_is_deterministic() {
    let calc = EventMetricsCalculator::new();
    let first = calc.compute(&truth_tracks(), &reconstructed());
    for _ in 0..10 {
        assert_eq!(calc.compute(&truth_tracks(), &reconstructed()), first);
    }
}
