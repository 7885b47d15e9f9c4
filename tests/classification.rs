use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use pitchscope::classifier::EventClassifier;
use pitchscope::config::CameraAngle;
use pitchscope::detector::JerseyOcr;
use pitchscope::detection::{BALL_LABEL, DetectedObject, FrameDetection, PERSON_LABEL};
use pitchscope::events::EventType;
use pitchscope::players::{PlayerOrigin, PlayerRegistry};
use pitchscope::roster::{ManualGoal, MatchSetup, Team};

/// Frames are 1000x1000 px: a linesman in the far corner pins the extent.
const FRAME_PX: f32 = 1000.0;

fn boxed(label: &str, cx: f32, cy: f32) -> DetectedObject {
    DetectedObject {
        label: label.to_string(),
        confidence: 0.9,
        x: cx - 5.0,
        y: cy - 5.0,
        width: 10.0,
        height: 10.0,
    }
}

fn corner_marker() -> DetectedObject {
    DetectedObject {
        label: PERSON_LABEL.to_string(),
        confidence: 0.5,
        x: FRAME_PX - 10.0,
        y: FRAME_PX - 10.0,
        width: 10.0,
        height: 10.0,
    }
}

fn frame(t: u32, ball: Option<(f64, f64)>, people: &[(f64, f64)]) -> FrameDetection {
    let mut objects = vec![corner_marker()];
    if let Some((x, y)) = ball {
        objects.push(boxed(BALL_LABEL, x as f32 * FRAME_PX, y as f32 * FRAME_PX));
    }
    for (x, y) in people {
        objects.push(boxed(PERSON_LABEL, *x as f32 * FRAME_PX, *y as f32 * FRAME_PX));
    }
    FrameDetection::new(t, t, objects)
}

fn classifier(max_events: usize) -> EventClassifier {
    EventClassifier::new(Uuid::new_v4(), CameraAngle::Overhead.thresholds(), max_events)
}

#[test]
fn fast_ball_into_the_right_net_scores() {
    let frames = vec![
        frame(10, Some((0.9, 0.5)), &[]),
        frame(11, Some((0.99, 0.5)), &[]),
    ];
    let mut registry = PlayerRegistry::seeded(&MatchSetup::default(), 22);
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let events = classifier(40).run(&frames, &[], &mut registry, &mut rng);

    assert_eq!(events.len(), 1);
    let goal = &events[0];
    assert_eq!(goal.event_type, EventType::GoalScored);
    assert_eq!(goal.timestamp, 11);
    assert_eq!(goal.successful, Some(true));
    assert!((goal.x_start - 0.9).abs() < 1e-3);
    assert!((goal.x_end - 0.99).abs() < 1e-3);
}

#[test]
fn stream_without_ball_keeps_only_manual_goals() {
    let frames: Vec<FrameDetection> = (0..60)
        .map(|t| frame(t, None, &[(0.3, 0.4), (0.6, 0.5)]))
        .collect();
    let goals = vec![
        ManualGoal {
            timestamp_seconds: 1800,
            team: Team::Away,
            jersey_number: 30,
            player_name: "Late Sub".to_string(),
        },
        ManualGoal {
            timestamp_seconds: 300,
            team: Team::Home,
            jersey_number: 3,
            player_name: String::new(),
        },
    ];
    let mut registry = PlayerRegistry::seeded(&MatchSetup::default(), 22);
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    let events = classifier(40).run(&frames, &goals, &mut registry, &mut rng);

    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.event_type == EventType::GoalScored));
    // Timeline order, not input order.
    assert_eq!(events[0].timestamp, 300);
    assert_eq!(events[0].player_name, "Player #3");
    assert_eq!(events[1].player_name, "Late Sub");
    assert!(events[1].x_end < 0.1, "away side attacks towards x = 0");

    let scorer = registry
        .find(Team::Away, 30)
        .map(|h| registry.get(h).clone())
        .expect("scorer record created");
    assert_eq!(scorer.origin, PlayerOrigin::GoalScorer);
    assert_eq!(scorer.player_name, "Late Sub");
}

#[test]
fn events_stay_on_the_pitch_and_under_the_cap() {
    let mut gen_rng = ChaCha8Rng::seed_from_u64(99);
    let mut ball = (0.5_f64, 0.5_f64);
    let frames: Vec<FrameDetection> = (0..400)
        .map(|t| {
            ball.0 = (ball.0 + gen_rng.gen_range(-0.08..0.08)).clamp(0.0, 0.98);
            ball.1 = (ball.1 + gen_rng.gen_range(-0.08..0.08)).clamp(0.0, 0.98);
            let people: Vec<(f64, f64)> = (0..6)
                .map(|_| {
                    (
                        (ball.0 + gen_rng.gen_range(-0.05..0.05)).clamp(0.0, 0.98),
                        (ball.1 + gen_rng.gen_range(-0.05..0.05)).clamp(0.0, 0.98),
                    )
                })
                .collect();
            frame(t, Some(ball), &people)
        })
        .collect();

    let mut registry = PlayerRegistry::seeded(&MatchSetup::default(), 22);
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let events = classifier(12).run(&frames, &[], &mut registry, &mut rng);

    assert!(!events.is_empty());
    assert!(events.len() <= 12);
    for e in &events {
        for v in [e.x_start, e.y_start, e.x_end, e.y_end] {
            assert!((0.0..=1.0).contains(&v), "{} out of bounds in {:?}", v, e.event_type);
        }
        assert!(e.distance_meters >= 0.0);
        assert!(e.jersey_number.is_some());
    }
    assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn same_seed_same_timeline() {
    let frames: Vec<FrameDetection> = (0..50)
        .map(|t| {
            let x = 0.2 + f64::from(t % 10) * 0.04;
            frame(t, Some((x, 0.5)), &[(x, 0.51), (x + 0.1, 0.4)])
        })
        .collect();
    let id = Uuid::new_v4();
    let run = |seed: u64| {
        let mut registry = PlayerRegistry::seeded(&MatchSetup::default(), 22);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        EventClassifier::new(id, CameraAngle::Overhead.thresholds(), 40)
            .run(&frames, &[], &mut registry, &mut rng)
    };
    assert_eq!(run(7), run(7));
}

#[test]
fn fallback_fills_an_empty_stream_only_when_enabled() {
    let frames: Vec<FrameDetection> = (0..30).map(|t| frame(t, None, &[(0.5, 0.5)])).collect();
    let mut registry = PlayerRegistry::seeded(&MatchSetup::default(), 22);
    let mut rng = ChaCha8Rng::seed_from_u64(8);

    let none = classifier(40).run(&frames, &[], &mut registry, &mut rng);
    assert!(none.is_empty());

    let filled = classifier(40)
        .with_fallback_events(true)
        .run(&frames, &[], &mut registry, &mut rng);
    assert!(!filled.is_empty());
    assert!(filled.len() <= 20);
}

/// Reads the same shirt number off everyone.
struct FixedNumber(u32);

impl JerseyOcr for FixedNumber {
    fn read_number(&mut self, _frame: &FrameDetection, _person: &DetectedObject) -> Option<u32> {
        Some(self.0)
    }
}

#[test]
fn jersey_read_mid_stream_registers_a_new_player() {
    let frames = vec![
        frame(0, Some((0.30, 0.4)), &[(0.30, 0.4)]),
        frame(1, Some((0.32, 0.4)), &[(0.32, 0.4)]),
    ];
    let mut registry = PlayerRegistry::seeded(&MatchSetup::default(), 22);
    assert!(registry.find(Team::Home, 23).is_none());
    let mut rng = ChaCha8Rng::seed_from_u64(8);
    let events = classifier(40)
        .with_ocr(Some(Box::new(FixedNumber(23))))
        .run(&frames, &[], &mut registry, &mut rng);

    assert_eq!(registry.len(), 23);
    let handle = registry.find(Team::Home, 23).expect("discovered");
    assert_eq!(registry.get(handle).origin, PlayerOrigin::Discovered);
    assert_eq!(registry.get(handle).player_name, "Player #23");

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Dribble);
    assert_eq!(events[0].jersey_number, Some(23));
    assert_eq!(events[0].team, Team::Home);
}
