//! Running stored commands with a live log
//!
//! A [`RunSession`] owns one run slot. Starting a command composes a shell
//! invocation from the project root and the command's script (see
//! [`ShellEnvironment`]), launches it through a
//! [`Launcher`](command_executor::Launcher) and appends every output line to
//! the session log while the script runs. A second start while a run is in
//! progress is refused.
//!
//! ```no_run
//! use project_store::{ProjectStore, SledStore};
//! use run_session::{RunSession, SessionEvent};
//!
//! # fn example() -> anyhow::Result<()> {
//! let store = SledStore::open("/tmp/berth/db")?;
//! let graph = store.load_project_graph("demo")?.expect("project exists");
//! let command = graph.command("hello").expect("command exists").clone();
//!
//! let session = RunSession::default();
//! let events = session.subscribe();
//! session.start_scoped(&graph, &command);
//!
//! smol::block_on(async {
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             SessionEvent::Line(line) => println!("{}", line.text),
//!             SessionEvent::Finished { label, .. } => {
//!                 println!("{label}");
//!                 break;
//!             }
//!             SessionEvent::Started { .. } => {}
//!         }
//!     }
//! });
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod script;
pub mod session;
pub mod spawner;

pub use script::{DEFAULT_PATH_PREFIX, ShellEnvironment, shell_escape};
pub use session::{RunOutcome, RunSession, RunStatus, SessionEvent};
pub use spawner::{BoxedTask, SmolSpawner, Spawner};
