//! Input device enumeration on the default cpal host.

use cpal::traits::{DeviceTrait, HostTrait};

use audio_pipeline_core::models::audio_models::AudioDevice;
use audio_pipeline_core::models::error::CaptureError;

/// List input devices on the default host. cpal exposes no stable device
/// id, so the device name doubles as the id.
pub fn list_input_devices() -> Result<Vec<AudioDevice>, CaptureError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::HardwareError(format!("failed to enumerate input devices: {}", e)))?;

    let mut found = Vec::new();
    for (i, device) in devices.enumerate() {
        let name = device.name().unwrap_or_else(|_| format!("Input {}", i));
        found.push(AudioDevice {
            id: name.clone(),
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
        });
    }
    log::debug!("found {} input device(s) on {:?}", found.len(), host.id());
    Ok(found)
}

/// Default input device, or the input device whose name is `name`.
pub(crate) fn find_input_device(name: Option<&str>) -> Option<cpal::Device> {
    let host = cpal::default_host();
    match name {
        None => host.default_input_device(),
        Some(name) => host
            .input_devices()
            .ok()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false)),
    }
}
