//! # Order Servo
//!
//! Orders carry an opaque binary payload and return binary feedback.

use servo_core::{
    DispatchProcessor, ItemId, ItemStatus, QueueItemManager, RegistryUnitManager, ServoConfig,
    ServoItem, ServoResult,
};

use crate::pipeline::ServoPipeline;

/// An opaque work order routed by its `code`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Order {
    /// Identity.
    pub id: ItemId,
    /// Order type; selects the unit.
    pub code: String,
    /// Input data.
    pub payload: Vec<u8>,
    /// Output data written by the unit.
    pub feedback: Vec<u8>,
    /// Completion state.
    pub status: ItemStatus,
}

impl Order {
    /// Creates a pending order.
    pub fn new(id: ItemId, code: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            code: code.into(),
            payload: payload.into(),
            feedback: Vec::new(),
            status: ItemStatus::Pending,
        }
    }
}

impl ServoItem for Order {
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

/// Processor moving orders.
pub type OrderServoProcessor = DispatchProcessor<Order>;

/// Queue of pending orders.
pub type OrderManager = QueueItemManager<Order>;

/// Registry of order units.
pub type OrderUnitManager = RegistryUnitManager<Order>;

/// Fully wired order pipeline.
pub type OrderServo = ServoPipeline<Order>;

/// Builds an order pipeline named `"order"`.
///
/// # Errors
///
/// Returns `Io` if background workers cannot be spawned.
pub fn order_servo(config: &ServoConfig) -> ServoResult<OrderServo> {
    ServoPipeline::from_config("order", config)
}
