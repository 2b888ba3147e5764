use cucumber::given;

use crate::cucumber::{world::LifecycleSystem, LifecycleWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut LifecycleWorld) {
    let system = LifecycleSystem::new().await;
    world.system = Some(system);
}
