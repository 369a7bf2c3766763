//! Simulation automation client capability
//!
//! The bus simulator is driven through a vendor automation interface that this
//! crate does not implement. [`AutomationClient`] names the capabilities the
//! replay tooling consumes; an integrator supplies the implementation.
//!
//! All calls are synchronous and made from a single control thread. Errors
//! propagate immediately, except measurement start which is retried a bounded
//! number of times.

use crate::config::RetryPolicy;
use crate::timing::PreciseDelay;
use crate::types::{SpeedUnit, Trip};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

/// Result type for automation operations
pub type AutomationResult<T> = std::result::Result<T, AutomationError>;

/// Failures reported by an automation session
#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error("Simulation session is not open")]
    SessionNotOpen,

    #[error("Invalid simulation configuration: {0}")]
    InvalidSessionConfig(String),

    #[error("Signal unavailable: {0}")]
    SignalUnavailable(String),

    #[error("Environment variable unavailable: {0}")]
    EnvVarUnavailable(String),

    #[error("System variable unavailable: {namespace}::{name}")]
    SysVarUnavailable { namespace: String, name: String },

    #[error("Measurement did not start after {attempts} attempts, check the connection")]
    MeasurementStartTimeout { attempts: u32 },
}

/// Bus type a signal lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BusType {
    #[default]
    Can,
    Lin,
    Flexray,
    Ethernet,
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusType::Can => write!(f, "CAN"),
            BusType::Lin => write!(f, "LIN"),
            BusType::Flexray => write!(f, "FlexRay"),
            BusType::Ethernet => write!(f, "Ethernet"),
        }
    }
}

/// Address of a bus signal in the simulation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRef {
    /// Channel number, usually starting at 1
    pub channel: u8,
    /// Message the signal belongs to
    pub message: String,
    /// Signal name
    pub signal: String,
    #[serde(default)]
    pub bus: BusType,
}

impl SignalRef {
    pub fn new(channel: u8, message: impl Into<String>, signal: impl Into<String>) -> Self {
        Self {
            channel,
            message: message.into(),
            signal: signal.into(),
            bus: BusType::Can,
        }
    }

    pub fn on_bus(mut self, bus: BusType) -> Self {
        self.bus = bus;
        self
    }
}

impl fmt::Display for SignalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}::{}.{}",
            self.bus, self.channel, self.message, self.signal
        )
    }
}

/// Capabilities of a simulation automation session
pub trait AutomationClient {
    /// Load a simulation configuration (`.cfg`)
    fn open_session(&mut self, config: &Path) -> AutomationResult<()>;

    /// Stop any measurement and release the simulator
    fn close_session(&mut self) -> AutomationResult<()>;

    fn is_measurement_running(&self) -> AutomationResult<bool>;

    /// Ask the simulator to start measuring; acknowledgement is asynchronous
    fn request_measurement_start(&mut self) -> AutomationResult<()>;

    fn request_measurement_stop(&mut self) -> AutomationResult<()>;

    fn env_var(&self, name: &str) -> AutomationResult<f64>;

    fn set_env_var(&mut self, name: &str, value: f64) -> AutomationResult<()>;

    fn sys_var(&self, namespace: &str, name: &str) -> AutomationResult<f64>;

    fn set_sys_var(&mut self, namespace: &str, name: &str, value: f64) -> AutomationResult<()>;

    /// Every system variable of `namespace` as `(name, value)` pairs
    fn sys_vars(&self, namespace: &str) -> AutomationResult<Vec<(String, f64)>>;

    fn signal(&self, signal: &SignalRef) -> AutomationResult<f64>;

    fn set_signal(&mut self, signal: &SignalRef, value: f64) -> AutomationResult<()>;
}

/// Check a simulation configuration path before handing it to the simulator
pub fn validate_session_config(path: &Path) -> AutomationResult<()> {
    let is_cfg = path
        .extension()
        .and_then(|s| s.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("cfg"));

    if !is_cfg || !path.is_file() {
        return Err(AutomationError::InvalidSessionConfig(format!(
            "can't find simulation cfg file {:?}",
            path
        )));
    }
    Ok(())
}

/// Start measurement, retrying until the simulator acknowledges it
pub fn start_measurement<C: AutomationClient + ?Sized>(
    client: &mut C,
    policy: &RetryPolicy,
) -> AutomationResult<()> {
    let mut attempts = 0;
    while !client.is_measurement_running()? {
        if attempts == policy.attempts {
            return Err(AutomationError::MeasurementStartTimeout { attempts });
        }
        client.request_measurement_start()?;
        std::thread::sleep(policy.spacing());
        attempts += 1;
    }

    log::info!("Measurement running after {} start request(s)", attempts);
    Ok(())
}

/// Stop measurement if it is running
pub fn stop_measurement<C: AutomationClient + ?Sized>(client: &mut C) -> AutomationResult<()> {
    if client.is_measurement_running()? {
        client.request_measurement_stop()?;
        log::info!("Measurement stopped");
    }
    Ok(())
}

/// Write an environment variable and wait until reading it back agrees
pub fn set_env_var_verified<C: AutomationClient + ?Sized>(
    client: &mut C,
    name: &str,
    value: f64,
    timeout: Duration,
) -> AutomationResult<()> {
    client.set_env_var(name, value)?;

    let deadline = Instant::now() + timeout;
    loop {
        if client.env_var(name)? == value {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(AutomationError::EnvVarUnavailable(format!(
                "{} did not take value {}",
                name, value
            )));
        }
        std::thread::yield_now();
    }
}

/// Replays a trip onto simulated bus signals
#[derive(Debug, Clone)]
pub struct BusReplay {
    /// Signal carrying the speed
    pub speed_signal: SignalRef,
    /// Optional signal carrying the unit flag
    pub unit_signal: Option<SignalRef>,
    /// Unit of the trip's speeds
    pub unit: SpeedUnit,
    /// Raw value per unit of speed (raw = trunc(speed * scale))
    pub raw_scale: f64,
    delay: PreciseDelay,
}

impl BusReplay {
    pub fn new(speed_signal: SignalRef, unit: SpeedUnit) -> Self {
        Self {
            speed_signal,
            unit_signal: None,
            unit,
            raw_scale: 2.0,
            delay: PreciseDelay::default(),
        }
    }

    pub fn with_unit_signal(mut self, signal: SignalRef) -> Self {
        self.unit_signal = Some(signal);
        self
    }

    pub fn with_raw_scale(mut self, scale: f64) -> Self {
        self.raw_scale = scale;
        self
    }

    pub fn with_delay(mut self, delay: PreciseDelay) -> Self {
        self.delay = delay;
        self
    }

    /// Raw bus value for a physical speed
    pub fn raw_value(&self, speed: f64) -> f64 {
        (speed * self.raw_scale).trunc()
    }

    /// Drive the speed signal through `trip` in real time, then stop measurement
    ///
    /// The simulator must already be measuring. Returns the number of samples
    /// written.
    pub fn replay<C: AutomationClient + ?Sized>(
        &self,
        client: &mut C,
        trip: &Trip,
    ) -> AutomationResult<usize> {
        if let Some(unit_signal) = &self.unit_signal {
            client.set_signal(unit_signal, self.unit.raw() as f64)?;
        }

        log::info!(
            "Replaying {} samples onto {}",
            trip.len(),
            self.speed_signal
        );

        let total = trip.len();
        let step = (total / 100).max(1);
        let start = Instant::now();
        let mut offset = Duration::ZERO;

        for (i, sample) in trip.iter().enumerate() {
            offset += Duration::from_millis(sample.delta_ms);
            self.delay.sleep_until(start + offset);
            client.set_signal(&self.speed_signal, self.raw_value(sample.speed))?;
            if i % step == 0 {
                log::debug!("Replay progress: {}%", i * 100 / total);
            }
        }

        stop_measurement(client)?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    /// Simulator double whose measurement starts after `starts_needed` requests
    #[derive(Default)]
    struct FakeSimulator {
        starts_needed: u32,
        start_requests: u32,
        running: bool,
        env: HashMap<String, f64>,
        sys: BTreeMap<(String, String), f64>,
        writes: Vec<(String, f64)>,
    }

    impl AutomationClient for FakeSimulator {
        fn open_session(&mut self, _config: &Path) -> AutomationResult<()> {
            Ok(())
        }

        fn close_session(&mut self) -> AutomationResult<()> {
            self.running = false;
            Ok(())
        }

        fn is_measurement_running(&self) -> AutomationResult<bool> {
            Ok(self.running)
        }

        fn request_measurement_start(&mut self) -> AutomationResult<()> {
            self.start_requests += 1;
            if self.start_requests >= self.starts_needed {
                self.running = true;
            }
            Ok(())
        }

        fn request_measurement_stop(&mut self) -> AutomationResult<()> {
            self.running = false;
            Ok(())
        }

        fn env_var(&self, name: &str) -> AutomationResult<f64> {
            self.env
                .get(name)
                .copied()
                .ok_or_else(|| AutomationError::EnvVarUnavailable(name.to_string()))
        }

        fn set_env_var(&mut self, name: &str, value: f64) -> AutomationResult<()> {
            self.env.insert(name.to_string(), value);
            Ok(())
        }

        fn sys_var(&self, namespace: &str, name: &str) -> AutomationResult<f64> {
            self.sys
                .get(&(namespace.to_string(), name.to_string()))
                .copied()
                .ok_or_else(|| AutomationError::SysVarUnavailable {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                })
        }

        fn set_sys_var(&mut self, namespace: &str, name: &str, value: f64) -> AutomationResult<()> {
            self.sys.insert((namespace.to_string(), name.to_string()), value);
            Ok(())
        }

        fn sys_vars(&self, namespace: &str) -> AutomationResult<Vec<(String, f64)>> {
            Ok(self
                .sys
                .iter()
                .filter(|((ns, _), _)| ns == namespace)
                .map(|((_, name), value)| (name.clone(), *value))
                .collect())
        }

        fn signal(&self, signal: &SignalRef) -> AutomationResult<f64> {
            Err(AutomationError::SignalUnavailable(signal.to_string()))
        }

        fn set_signal(&mut self, signal: &SignalRef, value: f64) -> AutomationResult<()> {
            self.writes.push((signal.signal.clone(), value));
            Ok(())
        }
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy::new(5, Duration::from_millis(1))
    }

    #[test]
    fn test_sys_vars_listed_per_namespace() {
        let mut sim = FakeSimulator::default();
        sim.set_sys_var("Vehicle", "Speed", 12.0).unwrap();
        sim.set_sys_var("Vehicle", "Gear", 3.0).unwrap();
        sim.set_sys_var("Panel", "Speed", 1.0).unwrap();

        assert_eq!(
            sim.sys_vars("Vehicle").unwrap(),
            vec![("Gear".to_string(), 3.0), ("Speed".to_string(), 12.0)]
        );
        assert_eq!(sim.sys_var("Panel", "Speed").unwrap(), 1.0);
        assert!(sim.sys_vars("Engine").unwrap().is_empty());
        assert!(matches!(
            sim.sys_var("Engine", "Rpm"),
            Err(AutomationError::SysVarUnavailable { .. })
        ));
    }

    #[test]
    fn test_start_measurement_retries() {
        let mut sim = FakeSimulator {
            starts_needed: 3,
            ..Default::default()
        };
        start_measurement(&mut sim, &quick_retry()).unwrap();
        assert!(sim.running);
        assert_eq!(sim.start_requests, 3);
    }

    #[test]
    fn test_start_measurement_times_out_after_five_attempts() {
        let mut sim = FakeSimulator {
            starts_needed: 100,
            ..Default::default()
        };
        let err = start_measurement(&mut sim, &quick_retry()).unwrap_err();
        assert!(matches!(
            err,
            AutomationError::MeasurementStartTimeout { attempts: 5 }
        ));
        assert_eq!(sim.start_requests, 5);
    }

    #[test]
    fn test_start_accepts_fifth_acknowledgement() {
        let mut sim = FakeSimulator {
            starts_needed: 5,
            ..Default::default()
        };
        assert!(start_measurement(&mut sim, &quick_retry()).is_ok());
    }

    #[test]
    fn test_stop_measurement_is_idempotent() {
        let mut sim = FakeSimulator::default();
        stop_measurement(&mut sim).unwrap();
        sim.running = true;
        stop_measurement(&mut sim).unwrap();
        stop_measurement(&mut sim).unwrap();
        assert!(!sim.running);
    }

    #[test]
    fn test_env_var_roundtrip_and_missing() {
        let mut sim = FakeSimulator::default();
        set_env_var_verified(&mut sim, "EnvIgnition", 1.0, Duration::from_millis(10)).unwrap();
        assert_eq!(sim.env_var("EnvIgnition").unwrap(), 1.0);
        assert!(matches!(
            sim.env_var("Nope"),
            Err(AutomationError::EnvVarUnavailable(_))
        ));
    }

    #[test]
    fn test_validate_session_config() {
        assert!(validate_session_config(Path::new("missing.cfg")).is_err());

        let dir = tempfile::tempdir().unwrap();
        let cfg = dir.path().join("bench.cfg");
        std::fs::write(&cfg, "").unwrap();
        assert!(validate_session_config(&cfg).is_ok());

        let wrong = dir.path().join("bench.txt");
        std::fs::write(&wrong, "").unwrap();
        assert!(matches!(
            validate_session_config(&wrong),
            Err(AutomationError::InvalidSessionConfig(_))
        ));
    }

    #[test]
    fn test_bus_replay_writes_scaled_values() {
        let mut sim = FakeSimulator {
            running: true,
            ..Default::default()
        };
        let replay = BusReplay::new(SignalRef::new(1, "ESP_21", "VehSpeed"), SpeedUnit::Mph)
            .with_unit_signal(SignalRef::new(1, "Kombi_01", "SpeedUnit"))
            .with_delay(PreciseDelay::new(Duration::ZERO));
        let trip = Trip::from(vec![
            crate::types::SpeedSample::new(0, 10.3),
            crate::types::SpeedSample::new(2, 12.75),
        ]);

        let written = replay.replay(&mut sim, &trip).unwrap();
        assert_eq!(written, 2);
        assert_eq!(
            sim.writes,
            vec![
                ("SpeedUnit".to_string(), 1.0),
                ("VehSpeed".to_string(), 20.0),
                ("VehSpeed".to_string(), 25.0),
            ]
        );
        assert!(!sim.running);
    }

    #[test]
    fn test_signal_ref_display() {
        let sig = SignalRef::new(2, "ESP_21", "VehSpeed").on_bus(BusType::Lin);
        assert_eq!(sig.to_string(), "LIN2::ESP_21.VehSpeed");
    }
}
