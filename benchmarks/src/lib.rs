//! Scene builders shared by the benchmarks.

use anyhow::Result;
use glam::Vec2;
use rein2d::{
    BodyDef, BodyHandle, CircleShape, FixtureDef, PhysicsConfig, PhysicsWorld, PolygonShape,
    JointDef, RevoluteJointDef,
};

/// Static ground box whose top face is at y = 0.
pub fn add_ground(world: &mut PhysicsWorld, half_width: f32) -> Result<BodyHandle> {
    let ground = world.create_body(&BodyDef::new_static(Vec2::new(0.0, -0.5)));
    world.create_fixture(ground, FixtureDef::new(PolygonShape::new_box(half_width, 0.5)?))?;
    Ok(ground)
}

/// Columns of unit boxes stacked on the ground, `n` boxes in total.
pub fn setup_stacks(n: usize) -> Result<PhysicsWorld> {
    let mut world = PhysicsWorld::new(PhysicsConfig::default());
    let columns = (n as f32).sqrt().ceil().max(1.0) as usize;
    add_ground(&mut world, columns as f32 * 1.5 + 5.0)?;

    for i in 0..n {
        let column = i % columns;
        let row = i / columns;
        let x = (column as f32 - columns as f32 * 0.5) * 1.5;
        let y = 0.5 + row as f32 * 1.02;
        let body = world.create_body(&BodyDef::new_dynamic(Vec2::new(x, y)));
        world.create_fixture(
            body,
            FixtureDef::new(PolygonShape::new_box(0.5, 0.5)?)
                .with_density(1.0)
                .with_friction(0.6),
        )?;
    }
    Ok(world)
}

/// A pile of mixed circles and boxes dropped into a scattered heap.
pub fn setup_pile(n: usize) -> Result<PhysicsWorld> {
    let mut world = PhysicsWorld::new(PhysicsConfig::default());
    add_ground(&mut world, 40.0)?;

    let circle = CircleShape::new(0.4)?;
    for i in 0..n {
        let x = ((i * 7) % 40) as f32 - 20.0 + (i % 3) as f32 * 0.1;
        let y = 1.0 + (i / 40) as f32 * 1.1;
        let body = world.create_body(&BodyDef::new_dynamic(Vec2::new(x, y)));
        let def = if i % 2 == 0 {
            FixtureDef::new(circle.clone())
        } else {
            FixtureDef::new(PolygonShape::new_box(0.4, 0.3)?)
        };
        world.create_fixture(body, def.with_density(1.0))?;
    }
    Ok(world)
}

/// A hanging chain of `links` capsule-like boxes joined by revolute joints.
pub fn setup_chain(links: usize) -> Result<PhysicsWorld> {
    let mut world = PhysicsWorld::new(PhysicsConfig::default());
    let anchor = world.create_body(&BodyDef::new_static(Vec2::new(0.0, 20.0)));

    let mut prev = anchor;
    for i in 0..links {
        let x = 0.5 + i as f32;
        let body = world.create_body(&BodyDef::new_dynamic(Vec2::new(x, 20.0)));
        world.create_fixture(
            body,
            FixtureDef::new(PolygonShape::new_box(0.5, 0.125)?).with_density(20.0),
        )?;

        let (a, b) = match (world.body(prev), world.body(body)) {
            (Some(a), Some(b)) => (a, b),
            _ => anyhow::bail!("chain link {i} missing"),
        };
        let def = RevoluteJointDef::initialize(a, b, Vec2::new(i as f32, 20.0));
        world.create_joint(JointDef::new(prev, body, def))?;
        prev = body;
    }
    Ok(world)
}

/// Fast bullets fired at a thin wall, exercising time of impact.
pub fn setup_bullets(n: usize) -> Result<PhysicsWorld> {
    let mut world = PhysicsWorld::new(PhysicsConfig {
        gravity: Vec2::ZERO,
        ..Default::default()
    });
    let wall = world.create_body(&BodyDef::new_static(Vec2::new(10.0, 0.0)));
    world.create_fixture(
        wall,
        FixtureDef::new(PolygonShape::new_box(0.05, n as f32 + 1.0)?),
    )?;

    let shot = CircleShape::new(0.1)?;
    for i in 0..n {
        let y = i as f32 - n as f32 * 0.5;
        let def = BodyDef::new_dynamic(Vec2::new(0.0, y))
            .with_linear_velocity(Vec2::new(200.0, 0.0))
            .as_bullet();
        let body = world.create_body(&def);
        world.create_fixture(body, FixtureDef::new(shot.clone()).with_density(1.0))?;
    }
    Ok(world)
}

/// Advance `world` by `steps` fixed steps.
pub fn run_steps(world: &mut PhysicsWorld, steps: usize) -> Result<()> {
    for _ in 0..steps {
        world.step(1.0 / 60.0)?;
    }
    Ok(())
}
