//! # SERVO Demo
//!
//! Headless run of both pipelines:
//! - Command servo on background workers (`move`, `report`, and one unknown code)
//! - Order servo inline (`checksum`)
//!
//! Usage: `servo_demo [config.toml]`

use std::sync::Arc;
use std::time::{Duration, Instant};

use servo::core::{ExecutionMode, ItemIdGenerator, ServoConfig, ServoError, ServoResult};
use servo::{command_servo, init_logging, AppResult, Command, Order, OrderServo, ServoScheduler};

const COMMANDS: u64 = 200;
const ORDERS: u64 = 100;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

fn move_unit(command: &mut Command) -> ServoResult<()> {
    let parse = |index: usize| -> ServoResult<i64> {
        command
            .arg(index)
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| ServoError::UnitFailed {
                id: command.id,
                reason: format!("argument {index} is not an integer"),
            })
    };
    let (x, y) = (parse(0)?, parse(1)?);
    command.result = Some(format!("moved to ({x}, {y})"));
    Ok(())
}

fn report_unit(command: &mut Command) -> ServoResult<()> {
    command.result = Some(format!("report {} ok", command.id));
    Ok(())
}

fn checksum_unit(order: &mut Order) -> ServoResult<()> {
    let sum = order
        .payload
        .iter()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(*b)));
    order.feedback = sum.to_le_bytes().to_vec();
    Ok(())
}

fn load_config() -> AppResult<ServoConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!(%path, "loading config");
            Ok(ServoConfig::from_file(path)?)
        }
        None => Ok(ServoConfig::default()),
    }
}

fn main() -> AppResult<()> {
    let _guard = init_logging(servo::logging::default_log_dir())?;
    let config = load_config()?;
    tracing::info!(?config, "servo demo starting");

    let commands = command_servo(&config)?;
    commands
        .register("move", Arc::new(move_unit))
        .register("report", Arc::new(report_unit));

    let orders = OrderServo::with_mode("order", &config, ExecutionMode::Inline)?;
    orders.register("checksum", Arc::new(checksum_unit));

    let ids = ItemIdGenerator::new();
    for n in 0..COMMANDS {
        let command = match n % 3 {
            0 => Command::new(ids.next_id(), "move", [n.to_string(), (n * 2).to_string()]),
            1 => Command::new(ids.next_id(), "report", Vec::<String>::new()),
            _ => Command::new(ids.next_id(), "move", ["north", "east"]),
        };
        commands.submit(command)?;
    }
    commands.submit(Command::new(ids.next_id(), "teleport", ["0", "0"]))?;
    for n in 0..ORDERS {
        orders.submit(Order::new(ids.next_id(), "checksum", n.to_le_bytes().to_vec()))?;
    }

    let mut scheduler = ServoScheduler::new(&config.scheduler);
    scheduler.add(commands.tickable()).add(orders.tickable());
    let handle = scheduler.spawn()?;

    let started = Instant::now();
    while !(commands.is_idle() && orders.is_idle()) && started.elapsed() < DRAIN_TIMEOUT {
        std::thread::sleep(Duration::from_millis(10));
    }
    let tick_stats = handle.join();

    if !(commands.is_idle() && orders.is_idle()) {
        tracing::warn!(timeout = ?DRAIN_TIMEOUT, "pipelines did not drain");
    }

    let finished_commands = commands.take_completed();
    let failed = finished_commands
        .iter()
        .filter(|c| !matches!(c.status, servo::core::ItemStatus::Succeeded))
        .count();
    let finished_orders = orders.take_completed();

    tracing::info!(
        commands = finished_commands.len(),
        failed_commands = failed,
        orders = finished_orders.len(),
        elapsed = ?started.elapsed(),
        "pipelines drained"
    );
    tracing::info!(stats = ?commands.stats(), "command servo");
    tracing::info!(stats = ?orders.stats(), "order servo");
    tracing::info!(stats = ?tick_stats, "scheduler");

    Ok(())
}
