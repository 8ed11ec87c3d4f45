//! Device selection
//!
//! Resolves the discovered candidates to exactly one device:
//!
//! | Candidates | Index given | Result |
//! |------------|-------------|--------|
//! | 0 | any | `NoDevicesFound` |
//! | 1 | any | that device, no prompt |
//! | >1 | yes | `candidates[index - 1]` or `InvalidSelection` |
//! | >1 | no | interactive prompt until a valid number is entered |
//!
//! Candidate order follows reply arrival, so an index is only meaningful for
//! the run that printed it.

use crate::aggregator::CandidateDevice;
use std::io::{BufRead, Write};
use thiserror::Error;
use tracing::debug;

/// Selection errors
#[derive(Debug, Error)]
pub enum SelectError {
    #[error("No devices found")]
    NoDevicesFound,

    #[error("Invalid device selected: {0}")]
    InvalidSelection(usize),

    #[error("Failed to read selection: {0}")]
    Input(String),

    #[error("No valid selection after {0} attempts")]
    TooManyAttempts(usize),
}

/// Picks one candidate
#[derive(Debug, Clone, Copy, Default)]
pub struct Selector {
    /// Cap on interactive attempts (`None` prompts until a valid answer)
    max_attempts: Option<usize>,
}

impl Selector {
    /// Create a selector that prompts without limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up after `attempts` invalid answers; 0 means no limit
    pub fn with_max_attempts(attempts: usize) -> Self {
        Self {
            max_attempts: (attempts > 0).then_some(attempts),
        }
    }

    /// Resolve `candidates` to one device.
    ///
    /// `index` is 1-based. `input`/`output` are only touched when a prompt
    /// is needed.
    pub fn select<R: BufRead, W: Write>(
        &self,
        mut candidates: Vec<CandidateDevice>,
        index: Option<usize>,
        input: R,
        output: W,
    ) -> Result<CandidateDevice, SelectError> {
        match (candidates.len(), index) {
            (0, _) => Err(SelectError::NoDevicesFound),
            (1, _) => Ok(candidates.swap_remove(0)),
            (len, Some(index)) => {
                if index == 0 || index > len {
                    return Err(SelectError::InvalidSelection(index));
                }
                Ok(candidates.swap_remove(index - 1))
            }
            (_, None) => {
                let index = self.prompt(&candidates, input, output)?;
                Ok(candidates.swap_remove(index - 1))
            }
        }
    }

    /// Ask until a number in `1..=candidates.len()` is entered
    fn prompt<R: BufRead, W: Write>(
        &self,
        candidates: &[CandidateDevice],
        mut input: R,
        mut output: W,
    ) -> Result<usize, SelectError> {
        let io_err = |e: std::io::Error| SelectError::Input(e.to_string());

        for (i, device) in candidates.iter().enumerate() {
            writeln!(output, "  {}. {}", i + 1, device).map_err(io_err)?;
        }

        let mut attempts = 0;
        loop {
            if let Some(max) = self.max_attempts {
                if attempts >= max {
                    return Err(SelectError::TooManyAttempts(attempts));
                }
            }
            attempts += 1;

            write!(output, "> Select device to connect: ").map_err(io_err)?;
            output.flush().map_err(io_err)?;

            let mut line = String::new();
            if input.read_line(&mut line).map_err(io_err)? == 0 {
                return Err(SelectError::Input("end of input".to_string()));
            }

            let answer = line.trim();
            match answer.parse::<usize>() {
                Ok(index) if index >= 1 && index <= candidates.len() => {
                    debug!("Selected device {}", index);
                    return Ok(index);
                }
                _ => {
                    writeln!(output, "Invalid device selected: {}", answer).map_err(io_err)?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::IpAddr;

    fn candidates(n: u8) -> Vec<CandidateDevice> {
        (1..=n)
            .map(|i| {
                let ip: IpAddr = format!("192.168.1.{}", i).parse().unwrap();
                let mut device = CandidateDevice::manual(ip, 2080, 6450);
                device.info.device_name = format!("Device {}", i);
                device
            })
            .collect()
    }

    fn run(
        selector: Selector,
        devices: Vec<CandidateDevice>,
        index: Option<usize>,
        input: &str,
    ) -> (Result<CandidateDevice, SelectError>, String) {
        let mut output = Vec::new();
        let result = selector.select(devices, index, Cursor::new(input.to_string()), &mut output);
        (result, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_no_devices() {
        let (result, output) = run(Selector::new(), Vec::new(), None, "1\n");

        assert!(matches!(result, Err(SelectError::NoDevicesFound)));
        assert!(output.is_empty());
    }

    #[test]
    fn test_single_device_auto_selected() {
        let (result, output) = run(Selector::new(), candidates(1), None, "");

        assert_eq!(result.unwrap().info.device_name, "Device 1");
        assert!(output.is_empty());
    }

    #[test]
    fn test_explicit_index() {
        let (result, output) = run(Selector::new(), candidates(3), Some(2), "");

        assert_eq!(result.unwrap().info.device_name, "Device 2");
        assert!(output.is_empty());
    }

    #[test]
    fn test_explicit_index_out_of_range() {
        let (result, _) = run(Selector::new(), candidates(3), Some(0), "");
        assert!(matches!(result, Err(SelectError::InvalidSelection(0))));

        let (result, _) = run(Selector::new(), candidates(3), Some(4), "");
        assert!(matches!(result, Err(SelectError::InvalidSelection(4))));
    }

    #[test]
    fn test_prompt_reprompts_on_bad_input() {
        let (result, output) = run(Selector::new(), candidates(3), None, "abc\n0\n7\n 3 \n");

        assert_eq!(result.unwrap().info.device_name, "Device 3");
        assert!(output.contains("1. Device 1 (192.168.1.1)"));
        assert!(output.contains("3. Device 3 (192.168.1.3)"));
        assert_eq!(output.matches("> Select device to connect: ").count(), 4);
        assert!(output.contains("Invalid device selected: abc"));
        assert!(output.contains("Invalid device selected: 7"));
    }

    #[test]
    fn test_prompt_end_of_input() {
        let (result, _) = run(Selector::new(), candidates(2), None, "x\n");
        assert!(matches!(result, Err(SelectError::Input(_))));
    }

    #[test]
    fn test_prompt_attempt_cap() {
        let (result, output) = run(Selector::with_max_attempts(2), candidates(2), None, "9\n9\n1\n");

        assert!(matches!(result, Err(SelectError::TooManyAttempts(2))));
        assert_eq!(output.matches("> Select device to connect: ").count(), 2);
    }

    #[test]
    fn test_zero_attempt_cap_still_prompts() {
        let (result, output) = run(Selector::with_max_attempts(0), candidates(2), None, "9\n2\n");

        assert_eq!(result.unwrap().info.device_name, "Device 2");
        assert_eq!(output.matches("> Select device to connect: ").count(), 2);
    }
}
