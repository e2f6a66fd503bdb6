//! # Command Servo
//!
//! Commands are named operations with string arguments and a textual
//! result, e.g. `move 10 20` → `"moved to (10, 20)"`.

use servo_core::{
    DispatchProcessor, ItemId, ItemStatus, QueueItemManager, RegistryUnitManager, ServoConfig,
    ServoItem, ServoResult,
};

use crate::pipeline::ServoPipeline;

/// A named operation routed by its `code`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    /// Identity.
    pub id: ItemId,
    /// Operation name; selects the unit.
    pub code: String,
    /// Positional arguments.
    pub args: Vec<String>,
    /// Output written by the unit.
    pub result: Option<String>,
    /// Completion state.
    pub status: ItemStatus,
}

impl Command {
    /// Creates a pending command.
    pub fn new<I, S>(id: ItemId, code: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id,
            code: code.into(),
            args: args.into_iter().map(Into::into).collect(),
            result: None,
            status: ItemStatus::Pending,
        }
    }

    /// Argument at `index`, if present.
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

impl ServoItem for Command {
    fn id(&self) -> ItemId {
        self.id
    }

    fn kind(&self) -> &str {
        &self.code
    }

    fn status(&self) -> &ItemStatus {
        &self.status
    }

    fn set_status(&mut self, status: ItemStatus) {
        self.status = status;
    }
}

/// Processor moving commands.
pub type CommandServoProcessor = DispatchProcessor<Command>;

/// Queue of pending commands.
pub type CommandManager = QueueItemManager<Command>;

/// Registry of command units.
pub type CommandUnitManager = RegistryUnitManager<Command>;

/// Fully wired command pipeline.
pub type CommandServo = ServoPipeline<Command>;

/// Builds a command pipeline named `"command"`.
///
/// # Errors
///
/// Returns `Io` if background workers cannot be spawned.
pub fn command_servo(config: &ServoConfig) -> ServoResult<CommandServo> {
    ServoPipeline::from_config("command", config)
}
