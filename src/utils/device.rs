//! Compute device selection for candle.

use crate::core::FusionError;
use candle_core::Device;

#[cfg(not(feature = "cuda"))]
fn cuda_not_enabled() -> FusionError {
    FusionError::ConfigError {
        message: "CUDA support not enabled. Compile with --features cuda".to_string(),
    }
}

/// Parses a device string and creates a candle [`Device`].
///
/// # Supported formats
///
/// - `"auto"` → CUDA device 0 when available, otherwise CPU
/// - `"cpu"` → CPU device
/// - `"cuda"` or `"gpu"` → CUDA device 0
/// - `"cuda:N"` → CUDA device N (e.g., `"cuda:1"`)
///
/// # Errors
///
/// Returns an error if:
/// - The device string is invalid
/// - CUDA is requested but the `cuda` feature is not enabled
/// - CUDA device creation fails
///
/// # Examples
///
/// ```
/// use fusion_gan::utils::parse_device;
///
/// let cpu = parse_device("cpu").unwrap();
/// assert!(cpu.is_cpu());
/// assert!(parse_device("tpu").is_err());
/// ```
pub fn parse_device(device_str: &str) -> Result<Device, FusionError> {
    let device_str = device_str.trim().to_lowercase();
    match device_str.as_str() {
        "auto" => Device::cuda_if_available(0).map_err(|e| FusionError::ConfigError {
            message: format!("Failed to probe CUDA device: {}", e),
        }),
        "cpu" => Ok(Device::Cpu),
        "cuda" | "gpu" => {
            #[cfg(feature = "cuda")]
            {
                Device::new_cuda(0).map_err(|e| FusionError::ConfigError {
                    message: format!("Failed to create CUDA device: {}", e),
                })
            }
            #[cfg(not(feature = "cuda"))]
            {
                Err(cuda_not_enabled())
            }
        }
        s if s.starts_with("cuda:") => {
            let ordinal: usize = s
                .strip_prefix("cuda:")
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| FusionError::ConfigError {
                    message: format!("Invalid CUDA device ordinal in '{}'", s),
                })?;
            #[cfg(feature = "cuda")]
            {
                Device::new_cuda(ordinal).map_err(|e| FusionError::ConfigError {
                    message: format!("Failed to create CUDA device {}: {}", ordinal, e),
                })
            }
            #[cfg(not(feature = "cuda"))]
            {
                let _ = ordinal;
                Err(cuda_not_enabled())
            }
        }
        _ => Err(FusionError::ConfigError {
            message: format!(
                "Unknown device: '{}'. Use 'auto', 'cpu', 'cuda', or 'cuda:N'",
                device_str
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_device() {
        assert!(parse_device("cpu").unwrap().is_cpu());
        assert!(parse_device(" CPU ").unwrap().is_cpu());
    }

    #[test]
    fn test_auto_device_resolves() {
        assert!(parse_device("auto").is_ok());
    }

    #[test]
    fn test_invalid_devices() {
        assert!(parse_device("tpu").is_err());
        assert!(parse_device("cuda:x").is_err());
    }
}
