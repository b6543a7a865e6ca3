#![deny(unsafe_code)]
#![no_main]
#![no_std]

use defmt_rtt as _; // global logger
use panic_probe as _;

mod persistent;
mod platform;
mod pwm;

use core::cell::RefCell;

use defmt::{info, unwrap, warn};
use embassy_executor::Spawner;
use embassy_rp::multicore::{spawn_core1, Stack};
use embassy_rp::pwm::{Config as PwmConfig, Pwm};
use embassy_rp::watchdog::{ResetReason, Watchdog};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{block_for, Duration, Instant, Ticker};
use static_cell::StaticCell;

use brickpico_core::config::ControllerConfig;
use brickpico_core::lock::BoundedMutex;
use brickpico_core::log_msg;
use brickpico_core::logger::{Logger, Priority};
use brickpico_core::output::{OutputController, OutputState};
use brickpico_core::pmem::PmemMutex;
use brickpico_core::pwm::{PwmDriver, PWM_WRAP_MAX, OUTPUT_MAX_COUNT};

use platform::{PmemLock, RpPlatform};
use pwm::RpPwmBank;

type SystemLogger = Logger<'static, 'static, PmemLock, RpPlatform>;

/// GPIOs driving outputs 1..16 (consecutive A/B pairs of slices 0..7)
const OUTPUT_PINS: [u8; OUTPUT_MAX_COUNT] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

const CONTROL_TICK: Duration = Duration::from_millis(10);
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);
/// RP2040 watchdog limit is ~8.3 s
const WATCHDOG_TIMEOUT: Duration = Duration::from_millis(8_000);
const UPTIME_LOCK_TIMEOUT_US: u64 = 1_000;

static CORE1_STACK: StaticCell<Stack<4096>> = StaticCell::new();
static PMEM: StaticCell<PmemMutex<'static, PmemLock>> = StaticCell::new();
static LOGGER: StaticCell<SystemLogger> = StaticCell::new();
static CONFIG: StaticCell<ControllerConfig> = StaticCell::new();

/// Commanded output state; written by command handlers, read by both cores.
static OUTPUT_STATE: Mutex<CriticalSectionRawMutex, RefCell<OutputState>> =
    Mutex::new(RefCell::new(OutputState {
        pwm: [0; OUTPUT_MAX_COUNT],
        pwr: [false; OUTPUT_MAX_COUNT],
    }));

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_rp::init(Default::default());
    info!("BrickPico starting...");

    let mut watchdog = Watchdog::new(p.WATCHDOG);
    let rebooted_by_watchdog = matches!(watchdog.reset_reason(), Some(ResetReason::TimedOut));

    // Core 1 is not running yet, so nobody can legitimately hold the lock.
    let lock = PmemLock::new();
    lock.force_release();

    let block = unwrap!(persistent::take());
    let boot = block.boot(rebooted_by_watchdog);
    match boot.reset_cause {
        Some(cause) => warn!("persistent memory reinitialized: {}", cause),
        None => info!(
            "persistent memory restored (previous uptime {} s)",
            boot.prev_uptime_us / 1_000_000
        ),
    }

    let config: &'static ControllerConfig = CONFIG.init(ControllerConfig::default());
    let pmem: &'static PmemMutex<'static, PmemLock> = PMEM.init(BoundedMutex::new(lock, block));
    let logger: &'static SystemLogger = LOGGER.init(Logger::new(pmem, RpPlatform, &config.log));

    log_msg!(logger, Priority::Notice, "System starting...");
    if rebooted_by_watchdog {
        log_msg!(logger, Priority::Crit, "Rebooted by watchdog");
    }

    log_msg!(logger, Priority::Notice, "Initializing PWM outputs...");
    let slices = [
        Pwm::new_output_ab(p.PWM_SLICE0, p.PIN_0, p.PIN_1, PwmConfig::default()),
        Pwm::new_output_ab(p.PWM_SLICE1, p.PIN_2, p.PIN_3, PwmConfig::default()),
        Pwm::new_output_ab(p.PWM_SLICE2, p.PIN_4, p.PIN_5, PwmConfig::default()),
        Pwm::new_output_ab(p.PWM_SLICE3, p.PIN_6, p.PIN_7, PwmConfig::default()),
        Pwm::new_output_ab(p.PWM_SLICE4, p.PIN_8, p.PIN_9, PwmConfig::default()),
        Pwm::new_output_ab(p.PWM_SLICE5, p.PIN_10, p.PIN_11, PwmConfig::default()),
        Pwm::new_output_ab(p.PWM_SLICE6, p.PIN_12, p.PIN_13, PwmConfig::default()),
        Pwm::new_output_ab(p.PWM_SLICE7, p.PIN_14, p.PIN_15, PwmConfig::default()),
    ];
    let sys_clock_hz = embassy_rp::clocks::clk_sys_freq();
    let driver = match PwmDriver::setup(
        RpPwmBank::new(slices),
        &OUTPUT_PINS,
        config.pwm_freq,
        sys_clock_hz,
    ) {
        Ok(driver) => driver,
        Err(e) => {
            log_msg!(logger, Priority::Crit, "PWM setup failed: {}", e);
            defmt::panic!("PWM setup failed: {}", e);
        }
    };
    let timing = *driver.timing();
    log_msg!(logger, Priority::Notice, "PWM Frequency: {} Hz", timing.frequency_hz);
    log_msg!(
        logger,
        Priority::Debug,
        "PWM: TOP={} (max {}), CLK_DIV={}",
        timing.wrap,
        PWM_WRAP_MAX,
        timing.clock_divider
    );

    let mut outputs = OutputController::new(driver, config);
    OUTPUT_STATE.lock(|state| *state.borrow_mut() = OutputState::from_config(config));

    let stack = CORE1_STACK.init(Stack::new());
    spawn_core1(p.CORE1, stack, move || housekeeping(logger));

    if cfg!(not(debug_assertions)) {
        watchdog.pause_on_debug(true);
        watchdog.start(WATCHDOG_TIMEOUT);
        info!("watchdog started ({} ms)", WATCHDOG_TIMEOUT.as_millis());
    }

    let mut ticker = Ticker::every(CONTROL_TICK);
    loop {
        let state = OUTPUT_STATE.lock(|state| *state.borrow());
        outputs.tick(Instant::now().as_micros(), &state, config);
        watchdog.feed();
        ticker.next().await;
    }
}

/// Core 1: periodic uptime bookkeeping and output status reporting.
fn housekeeping(logger: &'static SystemLogger) -> ! {
    log_msg!(logger, Priority::Info, "core1: housekeeping started");
    let mut last_mask = None;
    loop {
        block_for(HOUSEKEEPING_INTERVAL);

        let uptime_us = Instant::now().as_micros();
        match logger
            .pmem()
            .lock_timeout(logger.platform(), UPTIME_LOCK_TIMEOUT_US)
        {
            Ok(mut block) => block.record_uptime(uptime_us, None),
            Err(e) => {
                log_msg!(logger, Priority::Warning, "uptime not saved: {}", e);
            }
        }

        let mask = OUTPUT_STATE.lock(|state| power_mask(&state.borrow()));
        if last_mask != Some(mask) {
            logger.debug(1, format_args!("outputs on: 0x{:04x}", mask));
            last_mask = Some(mask);
        }
    }
}

fn power_mask(state: &OutputState) -> u16 {
    state
        .pwr
        .iter()
        .enumerate()
        .filter(|(_, on)| **on)
        .fold(0, |mask, (i, _)| mask | (1 << i))
}
