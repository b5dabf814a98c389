//! Where run tasks execute

use std::future::Future;
use std::pin::Pin;

/// A boxed future handed to a [`Spawner`]
pub type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A spawner that can run futures in the background
pub trait Spawner: Send + Sync {
    /// Spawn a future on the runtime
    ///
    /// The future will run to completion in the background.
    fn spawn(&self, future: BoxedTask);
}

/// Spawner for the smol global executor
#[derive(Debug, Clone, Copy, Default)]
pub struct SmolSpawner;

impl Spawner for SmolSpawner {
    fn spawn(&self, future: BoxedTask) {
        smol::spawn(future).detach();
    }
}
