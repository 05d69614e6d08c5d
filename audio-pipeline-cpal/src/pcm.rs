//! Float sample to little-endian integer PCM conversion.

/// Append `sample` as a signed little-endian integer of `bits` width.
///
/// Samples are clamped to `[-1.0, 1.0]`. Widths other than 16, 24 and 32
/// are rejected by `AudioFormat::validate` before a stream is opened.
pub fn push_sample(sample: f32, bits: u16, out: &mut Vec<u8>) {
    let s = f64::from(sample.clamp(-1.0, 1.0));
    match bits {
        16 => out.extend_from_slice(&((s * f64::from(i16::MAX)) as i16).to_le_bytes()),
        24 => {
            let v = (s * 8_388_607.0) as i32;
            out.extend_from_slice(&v.to_le_bytes()[..3]);
        }
        _ => out.extend_from_slice(&((s * f64::from(i32::MAX)) as i32).to_le_bytes()),
    }
}

/// Encode the `selected` channels of interleaved `data` as PCM.
///
/// `data` holds frames of `channels` samples; a trailing partial frame is
/// ignored. Channels are written in the order given by `selected`.
pub fn encode_frames(data: &[f32], channels: usize, selected: &[usize], bits: u16, out: &mut Vec<u8>) {
    if channels == 0 {
        return;
    }
    for frame in data.chunks_exact(channels) {
        for &ch in selected {
            if let Some(&sample) = frame.get(ch) {
                push_sample(sample, bits, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_scale_values() {
        let mut out = Vec::new();
        push_sample(1.0, 16, &mut out);
        push_sample(-1.0, 16, &mut out);
        push_sample(0.0, 16, &mut out);
        assert_eq!(out, [0xFF, 0x7F, 0x01, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn widths_produce_expected_byte_counts() {
        for (bits, len) in [(16, 2), (24, 3), (32, 4)] {
            let mut out = Vec::new();
            push_sample(0.5, bits, &mut out);
            assert_eq!(out.len(), len, "{}-bit", bits);
        }
    }

    #[test]
    fn out_of_range_is_clamped() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        push_sample(3.0, 32, &mut a);
        push_sample(1.0, 32, &mut b);
        assert_eq!(a, b);
        assert_eq!(i32::from_le_bytes([a[0], a[1], a[2], a[3]]), i32::MAX);
    }

    #[test]
    fn selects_left_channel_only() {
        // Stereo frames (L, R): keep only L.
        let data = [1.0, 0.0, -1.0, 0.0, 0.0, 1.0];
        let mut out = Vec::new();
        encode_frames(&data, 2, &[0], 16, &mut out);
        assert_eq!(out, [0xFF, 0x7F, 0x01, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn partial_trailing_frame_is_dropped() {
        let mut out = Vec::new();
        encode_frames(&[0.0, 0.0, 0.0], 2, &[0, 1], 16, &mut out);
        assert_eq!(out.len(), 4);
    }
}
