pub mod recharge_monitor;

pub use recharge_monitor::RechargeMonitorWorker;
