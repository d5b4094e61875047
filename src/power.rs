//! Available-power source for the global cap.
//!
//! Polled from the scheduler's idle branch at most once a minute. An
//! operator override file wins over everything; otherwise, during daylight
//! hours, an external command is asked for a solar generation figure. Any
//! failure leaves the cap as it was.

use crate::constants::*;
use log::{debug, info, warn};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

pub struct PowerSource {
    override_path: PathBuf,
    solar_command: Option<String>,
}

impl PowerSource {
    pub fn new(override_path: impl Into<PathBuf>, solar_command: Option<String>) -> Self {
        Self {
            override_path: override_path.into(),
            solar_command,
        }
    }

    /// Source with no solar command and the default override file.
    pub fn file_only() -> Self {
        Self::new(OVERRIDE_FILE, None)
    }

    /// Compute the new global cap in cA. `current_cap_ca` is returned
    /// unchanged when no source produces a value.
    pub fn poll(&self, local_hour: u32, current_cap_ca: i32) -> i32 {
        if let Some(cap) = self.read_override() {
            if cap != current_cap_ca {
                info!("Override file caps charging at {} cA", cap);
            }
            return cap;
        }

        if !(SOLAR_WINDOW_START_HOUR..SOLAR_WINDOW_END_HOUR).contains(&local_hour) {
            debug!("Outside the solar window (hour {}), cap unchanged", local_hour);
            return current_cap_ca;
        }

        let Some(cmd) = &self.solar_command else {
            return current_cap_ca;
        };
        match run_solar_command(cmd) {
            Some(output) => match parse_solar_output(&output) {
                Some(cap) => {
                    if cap != current_cap_ca {
                        info!("Solar meter allows {} cA", cap);
                    }
                    cap
                }
                None => {
                    warn!("No Solar line in meter output, cap unchanged");
                    current_cap_ca
                }
            },
            None => current_cap_ca,
        }
    }

    fn read_override(&self) -> Option<i32> {
        let text = std::fs::read_to_string(&self.override_path).ok()?;
        let line = text.lines().next().unwrap_or("").trim();
        match line.parse::<u32>() {
            Ok(n) => Some(n as i32),
            Err(_) => {
                warn!(
                    "Override file {} does not start with a non-negative integer",
                    self.override_path.display()
                );
                None
            }
        }
    }
}

/// Run the meter command through the shell with a hard deadline. Returns its
/// stdout, or `None` on spawn failure, non-zero exit, or timeout.
fn run_solar_command(cmd: &str) -> Option<String> {
    let mut child = match Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to spawn solar command: {}", e);
            return None;
        }
    };

    let deadline = Instant::now() + SOLAR_CMD_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if !status.success() {
                    warn!("Solar command exited with {}", status);
                    return None;
                }
                break;
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    warn!("Solar command exceeded its 4 s deadline, killing it");
                    let _ = child.kill();
                    let _ = child.wait();
                    return None;
                }
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                warn!("Failed to poll solar command: {}", e);
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
        }
    }

    let mut output = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        if let Err(e) = stdout.read_to_string(&mut output) {
            warn!("Failed to read solar command output: {}", e);
            return None;
        }
    }
    Some(output)
}

/// Find a `Solar,<timestamp>,-<float>,...` line and convert the generated
/// kilowatts to a centi-amp cap at mains voltage. Generation is reported
/// negative; a non-negative figure means the site is importing and does not
/// match.
fn parse_solar_output(output: &str) -> Option<i32> {
    for line in output.lines() {
        if !line.starts_with("Solar,") {
            continue;
        }
        let field = line.split(',').nth(2)?.trim();
        let Some(stripped) = field.strip_prefix('-') else {
            continue;
        };
        let kw: f64 = match stripped.parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        return Some(((kw * 1000.0 / MAINS_VOLTS) * 100.0).floor() as i32);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("twc-{}-{}", std::process::id(), name));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn override_file_wins_at_any_hour() {
        let path = scratch_file("override", "2500\n");
        let source = PowerSource::new(&path, Some("echo Solar,now,-9.9".into()));
        assert_eq!(source.poll(3, 1), 2500);
        assert_eq!(source.poll(12, 1), 2500);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn malformed_override_falls_through() {
        let path = scratch_file("bad-override", "lots\n");
        let source = PowerSource::new(&path, None);
        assert_eq!(source.poll(12, 1234), 1234);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn no_sources_leaves_cap_unchanged() {
        let source = PowerSource::new("/nonexistent/overrideMaxAmps.txt", None);
        assert_eq!(source.poll(12, 777), 777);
    }

    #[test]
    fn solar_only_runs_inside_the_window() {
        let source = PowerSource::new(
            "/nonexistent/overrideMaxAmps.txt",
            Some("echo Solar,2026-08-02 10:00:00,-2.4,more".into()),
        );
        // 2.4 kW / 240 V = 10 A = 1000 cA.
        assert_eq!(source.poll(6, 1), 1000);
        assert_eq!(source.poll(19, 1), 1000);
        assert_eq!(source.poll(5, 1), 1);
        assert_eq!(source.poll(20, 1), 1);
    }

    #[test]
    fn importing_site_does_not_match() {
        assert_eq!(parse_solar_output("Solar,now,3.2,x"), None);
        assert_eq!(
            parse_solar_output("noise\nSolar,now,-3.6,x\n"),
            Some(1500)
        );
        assert_eq!(parse_solar_output("Solar,now,junk,x"), None);
        assert_eq!(parse_solar_output(""), None);
    }

    #[test]
    fn conversion_floors_to_centiamps() {
        // 1 kW at 240 V = 4.1666.. A -> 416 cA.
        assert_eq!(parse_solar_output("Solar,t,-1.0"), Some(416));
    }
}
