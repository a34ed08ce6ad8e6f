//! Integration tests for eq_physics
//!
//! Whole-world scenarios: settling, queries against simulated state,
//! surfaces, contact events and shared access.

use approx::assert_relative_eq;
use eq_physics::prelude::*;
use rapier3d::na::UnitQuaternion;
use rapier3d::parry::math::{Point, Vector};
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ground() -> CollisionObject {
    ObjectDesc::new(ColliderShape::cuboid(50.0, 0.5, 50.0))
        .with_position(0.0, -0.5, 0.0)
        .build()
        .unwrap()
}

fn sphere(y: f32) -> CollisionObject {
    ObjectDesc::new(ColliderShape::sphere(0.5))
        .with_position(0.0, y, 0.0)
        .with_linear_velocity(0.0, -5.0, 0.0)
        .build()
        .unwrap()
}

fn surfaces() -> SurfaceParamTable {
    SurfaceParamTable::from_json(
        r#"[
            { "name": "asphalt", "friction": 0.9, "restitution": 0.1, "tire_friction": 1.0, "tire_traction": 1.0, "word": "A" },
            { "name": "dirt", "friction": 0.6, "restitution": 0.0, "tire_friction": 0.7, "tire_traction": 0.6, "word": "D" },
            { "name": "grass", "friction": 0.4, "restitution": 0.0, "tire_friction": 0.5, "tire_traction": 0.4, "word": "G" }
        ]"#,
    )
    .unwrap()
}

#[test]
fn test_sphere_settles_and_ray_finds_ground() {
    init_logging();
    let mut world = PhysicsWorld::new(PhysicsConfig::default()).unwrap();
    let ground = world.add_static_object(ground());
    let ball = world.add_to_world(sphere(10.0), true);

    for _ in 0..240 {
        world.simulate_step(1.0 / 60.0, 1);
    }

    let body = world.object(ball).unwrap();
    assert_relative_eq!(body.position().y, 0.5, epsilon = 0.05);
    assert!(body.linear_velocity().norm() < 0.1);

    let start = Point::new(0.0, 5.0, 0.0);
    let end = Point::new(0.0, -5.0, 0.0);

    // Excluding the sphere the ray reaches the ground top face
    let filter = CollisionFilter::exclude_object(ball);
    let mut coll = CollisionData::default();
    assert!(world.test_line_collision(&start, &end, &mut coll, u32::MAX, Some(&filter)));
    assert_eq!(coll.hit_object, Some(ground));
    assert_relative_eq!(coll.fract, 0.5, epsilon = 1e-4);
    assert_relative_eq!(coll.normal, Vector::y(), epsilon = 1e-4);

    // Without a filter the sphere is in the way
    let mut coll = CollisionData::default();
    assert!(world.test_line_collision(&start, &end, &mut coll, u32::MAX, None));
    assert_eq!(coll.hit_object, Some(ball));
    assert!(coll.fract < 0.5);
}

#[test]
fn test_single_pointer_filter() {
    let mut world = PhysicsWorld::default();
    let p = world.add_to_world(sphere(3.0), true);
    let q = world.add_static_object(ground());

    let filter = CollisionFilter::exclude_object(p);
    assert!(filter.has_object(p));
    assert!(!filter.has_object(q));
    assert!(!world.check_allow_contact_test(Some(&filter), p));
    assert!(world.check_allow_contact_test(Some(&filter), q));
}

#[test]
fn test_chained_queries_keep_nearest() {
    let mut world = PhysicsWorld::default();
    let near = world.add_static_object(
        ObjectDesc::new(ColliderShape::cuboid(0.5, 3.0, 3.0))
            .with_position(10.0, 0.0, 0.0)
            .build()
            .unwrap(),
    );
    world.add_static_object(
        ObjectDesc::new(ColliderShape::cuboid(0.5, 3.0, 3.0))
            .with_position(20.0, 0.0, 0.0)
            .build()
            .unwrap(),
    );
    let start = Point::new(0.0, 0.0, 0.0);
    let end = Point::new(40.0, 0.0, 0.0);

    let probe = ColliderShape::sphere(1.0).to_shared().unwrap();
    let mut coll = CollisionData::default();
    assert!(world.test_convex_sweep_collision(
        probe.as_ref(),
        &UnitQuaternion::identity(),
        &start,
        &end,
        &mut coll,
        u32::MAX,
        None
    ));
    let swept = coll.fract;
    assert_eq!(coll.hit_object, Some(near));

    // The line hits later than the sweep and must not overwrite it
    assert!(!world.test_line_collision(&start, &end, &mut coll, u32::MAX, None));
    assert_eq!(coll.fract, swept);
}

#[test]
fn test_zero_length_line_inside_object() {
    let mut world = PhysicsWorld::default();
    let ground = world.add_static_object(ground());

    let inside = Point::new(3.0, -0.25, -7.0);
    let mut coll = CollisionData::default();
    assert!(world.test_line_collision(&inside, &inside, &mut coll, u32::MAX, None));
    assert_eq!(coll.hit_object, Some(ground));
    assert_eq!(coll.fract, 0.0);
    assert_eq!(coll.normal, Vector::zeros());

    let above = Point::new(3.0, 2.0, -7.0);
    let mut coll = CollisionData::default();
    assert!(!world.test_line_collision(&above, &above, &mut coll, u32::MAX, None));
    assert!(coll.hit_object.is_none());
}

#[test]
fn test_mesh_surface_reported_by_ray() {
    let table = surfaces();
    let dirt = table.find("dirt").unwrap().id;
    let grass = table.find("grass").unwrap().id;
    let asphalt = table.find("Asphalt").unwrap().id;

    let mut world = PhysicsWorld::default();
    world.set_surface_params(Arc::new(table));

    let road = ObjectDesc::new(ColliderShape::TriMesh {
        vertices: vec![
            [-10.0, 0.0, -10.0],
            [10.0, 0.0, -10.0],
            [10.0, 0.0, 10.0],
            [-10.0, 0.0, 10.0],
        ],
        indices: vec![[0, 2, 1], [0, 3, 2]],
        surfaces: vec![dirt, grass],
    })
    .with_surface(asphalt)
    .build()
    .unwrap();
    let road = world.add_static_object(road);

    let mut coll = CollisionData::default();
    assert!(world.test_line_collision(
        &Point::new(5.0, 2.0, -5.0),
        &Point::new(5.0, -2.0, -5.0),
        &mut coll,
        u32::MAX,
        None
    ));
    assert_eq!(coll.hit_object, Some(road));
    assert_eq!(coll.material_index, Some(dirt));

    let wheel = ColliderShape::sphere(0.5).to_shared().unwrap();
    let mut coll = CollisionData::default();
    assert!(world.test_convex_sweep_collision(
        wheel.as_ref(),
        &UnitQuaternion::identity(),
        &Point::new(5.0, 2.0, -5.0),
        &Point::new(5.0, -2.0, -5.0),
        &mut coll,
        u32::MAX,
        None
    ));
    assert_eq!(coll.hit_object, Some(road));
    assert_eq!(coll.material_index, Some(dirt));

    let mut coll = CollisionData::default();
    world.test_line_collision(
        &Point::new(-5.0, 2.0, 5.0),
        &Point::new(-5.0, -2.0, 5.0),
        &mut coll,
        u32::MAX,
        None,
    );
    assert_eq!(coll.material_index, Some(grass));

    let surface = world.get_surface_param_by_id(coll.material_index.unwrap()).unwrap();
    assert_eq!(surface.name, "grass");
    assert_eq!(surface.word, 'G');
}

#[test]
fn test_surface_lookup_round_trip() {
    let mut world = PhysicsWorld::default();
    world.set_surface_params(Arc::new(surfaces()));

    let dirt = world.find_surface_param("dirt").unwrap();
    let by_id = world.get_surface_param_by_id(dirt.id).unwrap();
    assert_eq!(by_id.name, "dirt");
    assert!(world.find_surface_param("lava").is_none());
}

#[test]
fn test_contact_events_reach_subscribers() {
    init_logging();
    let mut world = PhysicsWorld::default();
    world.add_static_object(ground());
    let ball = world.add_to_world(sphere(0.6), true);

    let events = world.subscribe_contacts();
    let dropped = world.subscribe_contacts();
    drop(dropped);

    for _ in 0..10 {
        world.simulate_step(1.0 / 60.0, 1);
    }

    let received: Vec<ContactPair> = events.try_iter().collect();
    assert!(!received.is_empty());
    assert!(received.iter().all(|pair| pair.body_a == ball));
    assert!(received[0].impact_velocity > 0.0);
    assert!(received[0].applied_impulse > 0.0);
}

#[test]
fn test_simulation_is_deterministic() {
    fn run() -> Vec<(f32, f32, f32)> {
        let mut world = PhysicsWorld::default();
        world.add_static_object(ground());
        let mut handles = Vec::new();
        for i in 0..6 {
            let body = ObjectDesc::new(ColliderShape::cuboid(0.5, 0.5, 0.5))
                .with_position(i as f32 * 0.8, 1.0 + i as f32, 0.0)
                .with_rotation_euler(0.1 * i as f32, 0.0, 0.2)
                .build()
                .unwrap();
            handles.push(world.add_to_world(body, true));
        }
        world.simulate_step(1.0 / 60.0, 120);
        handles
            .iter()
            .map(|h| {
                let p = world.object(*h).unwrap().position();
                (p.x, p.y, p.z)
            })
            .collect()
    }

    assert_eq!(run(), run());
}

#[test]
fn test_config_from_json_drives_world() {
    let config = PhysicsConfig::from_json(r#"{ "gravity": [0.0, -20.0, 0.0], "grid_cell_size": 16.0 }"#).unwrap();
    let mut world = PhysicsWorld::new(config).unwrap();
    assert_eq!(world.grid().cell_size(), 16.0);

    let ball = world.add_to_world(
        ObjectDesc::new(ColliderShape::sphere(0.5)).with_position(0.0, 100.0, 0.0).build().unwrap(),
        true,
    );
    world.simulate_step(0.1, 1);
    assert_relative_eq!(world.object(ball).unwrap().linear_velocity().y, -2.0, epsilon = 1e-5);
}

#[test]
fn test_shared_world_parallel_queries() {
    let mut world = PhysicsWorld::default();
    world.add_static_object(ground());
    let shared = SharedPhysicsWorld::new(world);

    std::thread::scope(|scope| {
        for i in 0..4 {
            let shared = shared.clone();
            scope.spawn(move || {
                let x = i as f32 * 5.0;
                let mut coll = CollisionData::default();
                let hit = shared.read().test_line_collision(
                    &Point::new(x, 5.0, 0.0),
                    &Point::new(x, -5.0, 0.0),
                    &mut coll,
                    u32::MAX,
                    None,
                );
                assert!(hit);
                assert_relative_eq!(coll.fract, 0.5, epsilon = 1e-4);
            });
        }
    });

    assert_eq!(shared.read().raycast_count(), 4);
    shared.simulate_step(1.0 / 60.0, 1);
    assert_eq!(shared.read().raycast_count(), 0);
}
