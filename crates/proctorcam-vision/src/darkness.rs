use proctorcam_types::{frame::Frame, ProctorError, Result};

/// A pixel whose R, G and B are all below this value counts as black.
pub const BLACK_CHANNEL_THRESHOLD: u8 = 30;

/// Percentage of black pixels in `frame`, in `[0, 100]`.
///
/// An empty frame reports 0. Alpha is ignored.
pub fn black_pixel_percentage(frame: &Frame) -> f64 {
    let total = frame.pixel_count();
    if total == 0 {
        return 0.0;
    }
    let black = frame
        .data
        .chunks_exact(4)
        .take(total)
        .filter(|px| {
            px[0] < BLACK_CHANNEL_THRESHOLD
                && px[1] < BLACK_CHANNEL_THRESHOLD
                && px[2] < BLACK_CHANNEL_THRESHOLD
        })
        .count();
    // Multiply first so exact ratios such as 80/100 stay exact at the threshold.
    black as f64 * 100.0 / total as f64
}

/// Reject frames whose black share is strictly above `threshold_pct`.
///
/// Returns the measured percentage on success.
pub fn check_darkness(frame: &Frame, threshold_pct: f64) -> Result<f64> {
    let percentage = black_pixel_percentage(frame);
    if percentage > threshold_pct {
        Err(ProctorError::ImageTooDark {
            percentage,
            threshold: threshold_pct,
        })
    } else {
        Ok(percentage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_black_rows(width: u32, height: u32, black_rows: u32) -> Frame {
        let mut data = Vec::new();
        for y in 0..height {
            let v = if y < black_rows { 5 } else { 200 };
            for _ in 0..width {
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        Frame::from_rgba(width, height, data)
    }

    #[test]
    fn bright_frame_has_no_black_pixels() {
        let frame = Frame::solid(32, 24, [30, 30, 30]);
        assert_eq!(black_pixel_percentage(&frame), 0.0);
        assert!(check_darkness(&frame, 80.0).is_ok());
    }

    #[test]
    fn all_black_frame_is_rejected() {
        for (w, h) in [(1, 1), (7, 3), (64, 48)] {
            let frame = Frame::solid(w, h, [0, 0, 0]);
            assert_eq!(black_pixel_percentage(&frame), 100.0);
            assert!(matches!(
                check_darkness(&frame, 80.0),
                Err(ProctorError::ImageTooDark { .. })
            ));
        }
    }

    #[test]
    fn one_dark_channel_is_not_black() {
        let frame = Frame::solid(4, 4, [0, 0, 31]);
        assert_eq!(black_pixel_percentage(&frame), 0.0);
    }

    #[test]
    fn boundary_equal_to_threshold_passes() {
        let exactly = frame_with_black_rows(10, 10, 8);
        assert_eq!(black_pixel_percentage(&exactly), 80.0);
        assert_eq!(check_darkness(&exactly, 80.0).expect("not rejected"), 80.0);

        let above = frame_with_black_rows(10, 10, 9);
        assert!(check_darkness(&above, 80.0).is_err());
    }

    #[test]
    fn empty_frame_reports_zero() {
        assert_eq!(black_pixel_percentage(&Frame::empty()), 0.0);
    }
}
