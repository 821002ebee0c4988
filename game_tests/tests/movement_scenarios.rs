//! End-to-end character scenarios: input frames through orientation,
//! integration, grounding, footsteps and weapons, without any networking.

use std::sync::Arc;

use game_shared::{
    arena::Arena,
    character::{Character, CharacterEvent},
    clock::FixedStep,
    config::CharacterConfig,
    footsteps::{FootstepAction, FootstepCue},
    input::{InputButtons, InputLatch, InputSnapshot, MoveIntent},
    math::Vec3,
    movement::MovementStrategy,
    physics::CollisionQuery,
};

const DT: f32 = 0.02;

fn character_at(cfg: CharacterConfig, spawn: Vec3) -> Character {
    let (cfg, _) = cfg.validated();
    Character::new(Arc::new(cfg), spawn, None)
}

fn forward() -> MoveIntent {
    MoveIntent {
        wish: Vec3::FORWARD,
        ..Default::default()
    }
}

#[test]
fn sprinting_snaps_to_run_speed_along_body_yaw() {
    let arena = Arena::flat(100.0, vec![]);
    let world: &dyn CollisionQuery = &arena.collision;
    let mut c = character_at(CharacterConfig::default(), Vec3::ZERO);
    c.set_view(90.0, 0.0);

    let intent = MoveIntent {
        wish: Vec3::FORWARD,
        sprint: true,
        facing_yaw: c.pose().body_yaw,
        ..Default::default()
    };
    c.physics_tick(&intent, Some(world), DT);
    c.physics_tick(&intent, Some(world), DT);

    let v = c.velocity();
    assert!((v.x - 9.0).abs() < 1e-4, "v {v:?}");
    assert!(v.z.abs() < 1e-4);
    assert!(c.is_grounded());
}

#[test]
fn quake_ground_movement_builds_up_to_walk_speed() {
    let mut cfg = CharacterConfig::default();
    cfg.movement.strategy = MovementStrategy::Quake;
    let arena = Arena::flat(500.0, vec![]);
    let world: &dyn CollisionQuery = &arena.collision;
    let mut c = character_at(cfg, Vec3::ZERO);

    c.physics_tick(&forward(), Some(world), DT);
    c.physics_tick(&forward(), Some(world), DT);
    let early = c.velocity().horizontal().len();
    assert!(early > 0.0 && early < 5.0, "early {early}");

    for _ in 0..150 {
        c.physics_tick(&forward(), Some(world), DT);
    }
    let settled = c.velocity().horizontal().len();
    assert!((settled - 5.0).abs() < 0.1, "settled {settled}");

    // Letting go brakes to a stop.
    for _ in 0..60 {
        c.physics_tick(&MoveIntent::default(), Some(world), DT);
    }
    assert_eq!(c.velocity().horizontal().len(), 0.0);
}

#[test]
fn air_strafe_keeps_momentum_and_steers_slowly() {
    let arena = Arena::flat(100.0, vec![]);
    let world: &dyn CollisionQuery = &arena.collision;
    let mut c = character_at(CharacterConfig::default(), Vec3::new(0.0, 50.0, 0.0));
    c.correct(Vec3::new(0.0, 50.0, 0.0), Vec3::new(0.0, 0.0, 3.0));

    let strafe_right = MoveIntent {
        wish: Vec3::new(1.0, 0.0, 0.0),
        ..Default::default()
    };
    c.physics_tick(&strafe_right, Some(world), DT);

    let v = c.velocity();
    assert!(!c.is_grounded());
    assert_eq!(v.z, 3.0);
    assert!((v.x - 0.04).abs() < 1e-5, "v {v:?}");
    assert!((v.y + 0.4).abs() < 1e-5);

    // Air speed caps sideways acceleration, however long the strafe.
    for _ in 0..100 {
        c.physics_tick(&strafe_right, Some(world), DT);
    }
    assert!((c.velocity().x - 1.0).abs() < 1e-4);
    assert_eq!(c.velocity().z, 3.0);
}

#[test]
fn jump_pressed_in_air_fires_once_on_landing() {
    let arena = Arena::flat(100.0, vec![]);
    let world: &dyn CollisionQuery = &arena.collision;
    let mut c = character_at(CharacterConfig::default(), Vec3::new(0.0, 0.5, 0.0));

    let jump = MoveIntent {
        jump: true,
        ..Default::default()
    };
    c.physics_tick(&jump, Some(world), DT);
    assert!(!c.is_grounded());
    assert!(c.movement().jump_queued);

    let mut takeoffs = 0;
    let mut previous_vy = c.velocity().y;
    for _ in 0..120 {
        c.physics_tick(&MoveIntent::default(), Some(world), DT);
        let vy = c.velocity().y;
        if previous_vy <= 0.0 && vy > 0.0 {
            takeoffs += 1;
            assert!((vy - 8.0).abs() < 1e-4, "jump speed {vy}");
        }
        previous_vy = vy;
    }
    assert_eq!(takeoffs, 1);
    assert!(!c.movement().jump_queued);
    assert!(c.is_grounded());
}

#[test]
fn wall_probe_stops_airborne_push_into_wall() {
    let arena = Arena::walled(20.0, 4.0, vec![]);
    let world: &dyn CollisionQuery = &arena.collision;
    let start = Vec3::new(19.4, 1.0, 0.0);
    let toward_wall = Vec3::new(8.0, 0.0, 0.0);

    let mut probing = CharacterConfig::default();
    probing.movement.wall_probe = true;
    let mut c = character_at(probing, start);
    c.correct(start, toward_wall);
    c.physics_tick(&MoveIntent::default(), Some(world), DT);
    assert_eq!(c.velocity().horizontal(), Vec3::ZERO);
    assert!(c.velocity().y < 0.0);

    let mut c = character_at(CharacterConfig::default(), start);
    c.correct(start, toward_wall);
    c.physics_tick(&MoveIntent::default(), Some(world), DT);
    assert_eq!(c.velocity().x, 8.0);

    // Far from the wall the probe lets the body fly.
    let mut probing = CharacterConfig::default();
    probing.movement.wall_probe = true;
    let mut c = character_at(probing, Vec3::new(0.0, 1.0, 0.0));
    c.correct(Vec3::new(0.0, 1.0, 0.0), toward_wall);
    c.physics_tick(&MoveIntent::default(), Some(world), DT);
    assert_eq!(c.velocity().x, 8.0);
}

#[test]
fn inverted_look_bounds_are_fixed_once_and_enforced() {
    let mut cfg = CharacterConfig::default();
    cfg.look.min_pitch = 120.0;
    cfg.look.max_pitch = -30.0;
    let (cfg, warnings) = cfg.validated();
    assert_eq!((cfg.look.min_pitch, cfg.look.max_pitch), (-30.0, 90.0));
    assert_eq!(warnings.len(), 2);

    let mut c = Character::new(Arc::new(cfg), Vec3::ZERO, None);
    let look = |look_y| InputSnapshot {
        look_y,
        ..Default::default()
    };
    let render_dt = 1.0 / 144.0;
    for frame in 0..300 {
        let pose = c.render_tick(&look(5.0), frame as f64 * 0.01, render_dt);
        assert!(pose.view_pitch <= 90.0);
    }
    assert!((c.pose().view_pitch - 90.0).abs() < 1e-3);
    for frame in 0..300 {
        let pose = c.render_tick(&look(-5.0), frame as f64 * 0.01, render_dt);
        assert!(pose.view_pitch >= -30.0);
    }
    assert!((c.pose().view_pitch + 30.0).abs() < 1e-3);
}

#[test]
fn yaw_turns_the_short_way_round() {
    let mut c = character_at(CharacterConfig::default(), Vec3::ZERO);
    c.set_view(350.0, 0.0);
    // 20 degrees right crosses 360.
    let turn = InputSnapshot {
        look_x: 20.0 / 7.0,
        ..Default::default()
    };
    let first = c.render_tick(&turn, 0.0, 1.0 / 144.0);
    assert!(first.body_yaw > 350.0 || first.body_yaw < 10.0, "{first:?}");
    let idle = InputSnapshot::default();
    for _ in 0..200 {
        c.render_tick(&idle, 0.0, 1.0 / 144.0);
    }
    assert!((c.pose().body_yaw - 10.0).abs() < 1e-2, "{:?}", c.pose());
}

#[test]
fn render_frames_drive_fixed_physics_ticks() {
    let arena = Arena::flat(100.0, vec![]);
    let world: &dyn CollisionQuery = &arena.collision;
    let mut c = character_at(CharacterConfig::default(), Vec3::ZERO);
    let mut clock = FixedStep::from_hz(50);
    let mut latch = InputLatch::default();

    let held = InputSnapshot {
        forward: 1.0,
        held: InputButtons::JUMP,
        ..Default::default()
    };
    let mut previous = InputButtons::empty();
    let mut physics_ticks = 0;
    let mut jumps = 0;
    for frame in 0..144 {
        let input = held.with_edges(previous);
        previous = input.held;
        c.render_tick(&input, frame as f64 / 144.0, 1.0 / 144.0);
        latch.record(&input);
        for _ in 0..clock.advance(1.0 / 144.0) {
            let intent = latch.take_intent(c.pose().body_yaw);
            jumps += usize::from(intent.jump);
            c.physics_tick(&intent, Some(world), clock.step());
            physics_ticks += 1;
        }
    }
    // The jump edge is seen by exactly one physics tick though it is held
    // for the whole second.
    assert_eq!(jumps, 1);
    assert!((49..=50).contains(&physics_ticks), "{physics_ticks}");
    assert!((c.position().z - physics_ticks as f32 * 0.1).abs() < 1e-3);
}

#[test]
fn footsteps_play_walk_then_run_then_pause() {
    let arena = Arena::flat(100.0, vec![]);
    let world: &dyn CollisionQuery = &arena.collision;
    let mut c = character_at(CharacterConfig::default(), Vec3::ZERO);

    let walk = InputSnapshot {
        forward: 1.0,
        ..Default::default()
    };
    let run = InputSnapshot {
        held: InputButtons::RUN,
        ..walk
    };

    c.physics_tick(&forward(), Some(world), DT);
    c.render_tick(&walk, 0.0, DT);
    c.render_tick(&walk, 0.0, DT);
    c.render_tick(&run, 0.0, DT);
    c.physics_tick(&MoveIntent::default(), Some(world), DT);
    c.render_tick(&InputSnapshot::default(), 0.0, DT);

    let steps: Vec<FootstepAction> = c
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            CharacterEvent::Footsteps(action) => Some(action),
            _ => None,
        })
        .collect();
    assert_eq!(
        steps,
        vec![
            FootstepAction::Play(FootstepCue::Walk),
            FootstepAction::Play(FootstepCue::Run),
            FootstepAction::Pause,
        ]
    );
}

#[test]
fn holding_fire_empties_the_magazine_then_reloads() {
    let mut c = character_at(CharacterConfig::default(), Vec3::ZERO);
    let fire = InputSnapshot {
        held: InputButtons::FIRE,
        ..Default::default()
    };

    let mut events = Vec::new();
    for frame in 1..=800 {
        let now = frame as f64 * 0.01;
        c.render_tick(&fire, now, 0.01);
        events.extend(c.drain_events().into_iter().map(|e| (now, e)));
    }

    let fired: Vec<f64> = events
        .iter()
        .filter(|(_, e)| matches!(e, CharacterEvent::Fired { .. }))
        .map(|(t, _)| *t)
        .collect();
    for pair in fired.windows(2) {
        assert!(pair[1] - pair[0] >= 0.125 - 1e-9, "{pair:?}");
    }

    let reload_started = events
        .iter()
        .position(|(_, e)| *e == CharacterEvent::ReloadStarted)
        .expect("reload started");
    let shots_before = events[..reload_started]
        .iter()
        .filter(|(_, e)| matches!(e, CharacterEvent::Fired { .. }))
        .count();
    assert_eq!(shots_before, 15);

    let (reloaded_at, _) = events
        .iter()
        .find(|(_, e)| *e == CharacterEvent::Reloaded { ammo: 15 })
        .expect("reload finished");
    let started_at = events[reload_started].0;
    assert!((reloaded_at - started_at - 4.0).abs() < 0.011);
    assert!(fired.last().copied() > Some(*reloaded_at - 1e-9));
}

#[test]
fn switching_weapons_cancels_a_reload() {
    let mut c = character_at(CharacterConfig::default(), Vec3::ZERO);
    let frame = |held: InputButtons, pressed: InputButtons, slot: Option<u8>| InputSnapshot {
        held,
        pressed,
        select_slot: slot,
        ..Default::default()
    };

    c.render_tick(&frame(InputButtons::FIRE, InputButtons::FIRE, None), 0.0, 0.01);
    c.render_tick(&frame(InputButtons::empty(), InputButtons::RELOAD, None), 0.1, 0.01);
    assert!(c.loadout().active().expect("rifle").is_reloading());

    c.render_tick(&frame(InputButtons::empty(), InputButtons::empty(), Some(1)), 0.2, 0.01);
    assert_eq!(c.loadout().index(), 1);
    c.render_tick(&frame(InputButtons::empty(), InputButtons::empty(), Some(0)), 0.3, 0.01);

    let rifle = c.loadout().active().expect("rifle");
    assert!(!rifle.is_reloading());
    assert_eq!(rifle.ammo(), 14);

    let equips: Vec<CharacterEvent> = c
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, CharacterEvent::Equipped { .. }))
        .collect();
    assert_eq!(
        equips,
        vec![
            CharacterEvent::Equipped { index: 1 },
            CharacterEvent::Equipped { index: 0 },
        ]
    );
}
