use pretty_assertions::assert_eq;
use smf_timeline::{
    num::{u15, u24},
    Domain, Error, EventKind, EventSpec, Format, IoAction, Smf, Time, TimedMessage, Timing, Track,
    TrackSelector,
};

/// 96 PPQN, one track: tempo 500000 at pulse 0 and a note-on at pulse 96.
const SINGLE_NOTE: &[u8] = &[
    b'M', b'T', b'h', b'd', 0, 0, 0, 6, 0, 1, 0, 1, 0, 96, //
    b'M', b'T', b'r', b'k', 0, 0, 0, 15, //
    0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, //
    0x60, 0x90, 60, 100, //
    0x00, 0xFF, 0x2F, 0x00,
];

fn collect(smf: &Smf, selector: TrackSelector, domain: Domain) -> Vec<TimedMessage> {
    smf.events(selector, domain, 0.0, -1.0)
        .expect("selector names an existing track")
        .collect()
}

/// A two-track song at 480 PPQN, using the default tempo.
fn song() -> Smf {
    let mut smf = Smf::with_timing(Timing::Metrical(u15::new(480)));
    let melody = (0..16)
        .flat_map(|i| {
            let key = 60 + (i % 12);
            vec![
                EventSpec::new(i as f64 * 240.0, 0x90, key, 100),
                EventSpec::new(i as f64 * 240.0 + 200.0, 0x80, key, 0),
            ]
        })
        .collect::<Vec<_>>();
    let bass = (0..8)
        .flat_map(|i| {
            vec![
                EventSpec::new(i as f64 * 480.0, 0x91, 36, 90),
                EventSpec::new(i as f64 * 480.0, 0xB1, 7, 100),
                EventSpec::new(i as f64 * 480.0 + 480.0, 0x81, 36, 0),
            ]
        })
        .collect::<Vec<_>>();
    smf.add_events(Domain::Metrical, &melody).unwrap();
    smf.add_events(Domain::Metrical, &bass).unwrap();
    smf
}

#[test]
fn single_note_scenario() {
    let smf = Smf::parse(SINGLE_NOTE).unwrap();
    assert_eq!(smf.duration(Domain::Metrical), Time::Pulses(96));
    assert_eq!(smf.duration(Domain::Physical), Time::Seconds(0.5));

    let msgs = collect(&smf, TrackSelector::from_number(0).unwrap(), Domain::Physical);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].time, Time::Seconds(0.5));
    assert_eq!(msgs[0].bytes(), &[0x90, 60, 100][..]);
    assert_eq!(
        collect(&smf, TrackSelector::Track(1), Domain::Physical)[0].to_string(),
        "(0.5, 144, 60, 100)"
    );
}

#[test]
fn add_events_scenario() {
    let mut smf = Smf::with_timing(Timing::Metrical(u15::new(480)));
    smf.add_events(
        Domain::Metrical,
        &[
            EventSpec::new(0.0, 0x90, 64, 100),
            EventSpec::new(480.0, 0x80, 64, 0),
        ],
    )
    .unwrap();
    assert_eq!(smf.tracks().len(), 1);
    let pulses = smf.tracks()[0]
        .iter()
        .map(|ev| ev.pulses())
        .collect::<Vec<_>>();
    assert_eq!(pulses, vec![0, 480]);
    assert_eq!(smf.duration(Domain::Metrical), Time::Pulses(480));
}

#[test]
fn round_trip() {
    let smf = song();
    let raw = smf.to_bytes().unwrap();
    let reparsed = Smf::parse(&raw).unwrap();
    assert_eq!(reparsed.format(), Format::Parallel);
    assert_eq!(reparsed.timing(), smf.timing());
    for domain in [Domain::Metrical, Domain::Physical].iter().copied() {
        assert_eq!(
            collect(&reparsed, TrackSelector::All, domain),
            collect(&smf, TrackSelector::All, domain)
        );
    }
    //Saving again produces the very same bytes
    assert_eq!(reparsed.to_bytes().unwrap(), raw);
}

#[test]
fn monotonic_in_both_domains() {
    let smf = song();
    for selector in [TrackSelector::All, TrackSelector::Track(1), TrackSelector::Track(2)]
        .iter()
        .copied()
    {
        for domain in [Domain::Metrical, Domain::Physical].iter().copied() {
            let times = collect(&smf, selector, domain)
                .iter()
                .map(|msg| msg.time.as_f64())
                .collect::<Vec<_>>();
            assert!(!times.is_empty());
            assert!(
                times.windows(2).all(|pair| pair[0] <= pair[1]),
                "{:?} {:?} out of order",
                selector,
                domain
            );
        }
    }
}

#[test]
fn domain_consistency() {
    let mut smf = song();
    let mut conductor = Track::new();
    conductor.append_event_at_pulses(EventKind::tempo(u24::new(400_000)), 960);
    conductor.append_event_at_pulses(EventKind::tempo(u24::new(731_707)), 2_000);
    smf.push_track(conductor).unwrap();

    let map = smf.tempo_map();
    assert_eq!(map.entries().len(), 3);
    for pulses in (0..4_000).step_by(13) {
        let back = map.pulses_for_seconds(map.seconds_for_pulses(pulses));
        assert!((back as i64 - pulses as i64).abs() <= 1, "{} came back as {}", pulses, back);
    }
    for ev in smf.tracks().iter().flat_map(|track| track.iter()) {
        assert_eq!(ev.seconds(), map.seconds_for_pulses(ev.pulses()));
    }
}

#[test]
fn physical_insertion_follows_tempo() {
    let mut smf = Smf::parse(SINGLE_NOTE).unwrap();
    let number = smf
        .add_events(Domain::Physical, &[EventSpec::new(0.25, 0xC0, 3, 0)])
        .unwrap();
    assert_eq!(number, 2);
    assert_eq!(smf.format(), Format::Parallel);
    let track = smf.track(2).unwrap();
    assert_eq!(track.events()[0].pulses(), 48);
    assert_eq!(
        collect(&smf, TrackSelector::All, Domain::Metrical)
            .iter()
            .map(|msg| (msg.time, msg.track))
            .collect::<Vec<_>>(),
        vec![
            (Time::Pulses(48), Some(2)),
            (Time::Pulses(96), Some(1)),
        ]
    );
}

#[test]
fn save_and_load() {
    let smf = song();
    //Loaded tracks carry the end-of-track events added on save
    let expected = Smf::parse(&smf.to_bytes().unwrap()).unwrap();
    let path = std::env::temp_dir().join(format!("smf-timeline-{}.mid", std::process::id()));
    smf.save(&path).unwrap();
    let loaded = Smf::load(&path);
    std::fs::remove_file(&path).unwrap();
    assert_eq!(loaded.unwrap(), expected);

    let mut raw: Vec<u8> = Vec::new();
    smf.write(&mut raw).unwrap();
    assert_eq!(Smf::read(&raw[..]).unwrap(), expected);
}

#[test]
fn load_reports_missing_file() {
    let path = std::env::temp_dir().join("smf-timeline-does-not-exist.mid");
    match Smf::load(&path) {
        Err(Error::Io {
            resource, action, ..
        }) => {
            assert_eq!(action, IoAction::Read);
            assert_eq!(resource, path.display().to_string());
        }
        other => panic!("expected an io error, got {:?}", other.map(|smf| smf.to_string())),
    }
}

#[test]
fn rejects_unknown_tags() {
    assert!("ticks".parse::<Domain>().is_err());
    assert!("ppq".parse::<smf_timeline::InfoKey>().is_err());
    assert!(!smf_timeline::is_smf(b"MTrk\0\0\0\0"));
    assert!(smf_timeline::is_smf(SINGLE_NOTE));
}
