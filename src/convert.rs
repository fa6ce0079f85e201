// convert.rs — Frame bytes to the f32 planes the matcher works on.
//
// Matching happens on planar f32 images holding raw intensities (u8 42 →
// 42.0), so SAD costs come out in [0, 255] units. A frame becomes either
//   - one luma plane (grayscale input, or colour matching disabled), or
//   - three planes R, G, B (colour matching on and every frame is RGB).
//
// Luma uses the ITU-R BT.601 weights: Y = 0.299 R + 0.587 G + 0.114 B.

use crate::frame::FrameImage;
use crate::image::Image;

pub const LUMA_R: f32 = 0.299;
pub const LUMA_G: f32 = 0.587;
pub const LUMA_B: f32 = 0.114;

/// Split an interleaved frame into one `Image<f32>` per channel.
pub fn split_channels(frame: &FrameImage) -> Vec<Image<f32>> {
    (0..frame.channels())
        .map(|c| Image::from_fn(frame.width(), frame.height(), |x, y| frame.get(x, y, c) as f32))
        .collect()
}

/// Combine three channel planes into luma.
pub fn rgb_to_grayscale(r: &Image<f32>, g: &Image<f32>, b: &Image<f32>) -> Image<f32> {
    assert_eq!((r.width(), r.height()), (g.width(), g.height()));
    assert_eq!((r.width(), r.height()), (b.width(), b.height()));

    Image::from_fn(r.width(), r.height(), |x, y| {
        LUMA_R * r.get(x, y) + LUMA_G * g.get(x, y) + LUMA_B * b.get(x, y)
    })
}

/// Luma plane of a frame; grayscale frames are passed through.
pub fn frame_to_luma(frame: &FrameImage) -> Image<f32> {
    let mut planes = split_channels(frame);
    if planes.len() == 3 {
        rgb_to_grayscale(&planes[0], &planes[1], &planes[2])
    } else {
        planes.swap_remove(0)
    }
}

/// Planes used for matching: all channels when `color`, luma otherwise.
pub fn frame_to_planes(frame: &FrameImage, color: bool) -> Vec<Image<f32>> {
    if color && frame.channels() == 3 {
        split_channels(frame)
    } else {
        vec![frame_to_luma(frame)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_channels_raw_values() {
        let frame = FrameImage::from_rgb_fn(2, 1, |x, _| [10 + x as u8, 100, 255]).unwrap();
        let planes = split_channels(&frame);
        assert_eq!(planes.len(), 3);
        assert_eq!(planes[0].get(1, 0), 11.0);
        assert_eq!(planes[1].get(0, 0), 100.0);
        assert_eq!(planes[2].get(1, 0), 255.0);
    }

    #[test]
    fn test_luma_weights() {
        let red = FrameImage::from_rgb_fn(1, 1, |_, _| [100, 0, 0]).unwrap();
        assert!((frame_to_luma(&red).get(0, 0) - 29.9).abs() < 1e-4);

        // Equal channels keep their value (weights sum to 1).
        let grey = FrameImage::from_rgb_fn(1, 1, |_, _| [80, 80, 80]).unwrap();
        assert!((frame_to_luma(&grey).get(0, 0) - 80.0).abs() < 1e-4);

        let planes = split_channels(&grey);
        let y = rgb_to_grayscale(&planes[0], &planes[1], &planes[2]);
        assert!((y.get(0, 0) - 80.0).abs() < 1e-4);
    }

    #[test]
    fn test_planes_selection() {
        let rgb = FrameImage::from_rgb_fn(3, 2, |_, _| [1, 2, 3]).unwrap();
        assert_eq!(frame_to_planes(&rgb, true).len(), 3);
        assert_eq!(frame_to_planes(&rgb, false).len(), 1);

        let gray = FrameImage::from_gray_fn(3, 2, |x, _| x as u8).unwrap();
        let planes = frame_to_planes(&gray, true);
        assert_eq!(planes.len(), 1);
        assert_eq!(planes[0].get(2, 1), 2.0);
    }
}
