use crate::api::SCREEN_WIDTH;
use crate::video::registers::{ClipPlane, MixControl, NUM_CLIP_PLANES};
use tinyvec::ArrayVec;

// Inclusive X ranges; each inverted plane can split at most one range in two
pub type ClipRanges = ArrayVec<[(u16, u16); 8]>;

/// Resolve the screen X ranges a layer may draw into on this line.
pub fn resolve_clip_ranges(planes: &[ClipPlane; NUM_CLIP_PLANES], mix: MixControl) -> ClipRanges {
    let mut ranges = ClipRanges::new();
    ranges.push((0, SCREEN_WIDTH as u16 - 1));

    for (i, plane) in planes.iter().enumerate() {
        if !mix.clip_enabled(i) {
            continue;
        }

        let ClipPlane { left, right } = *plane;
        if !mix.clip_inverted(i) {
            if left > right {
                ranges.clear();
                break;
            }

            ranges.retain(|range| range.0 <= right && range.1 >= left);
            for range in ranges.iter_mut() {
                *range = (range.0.max(left), range.1.min(right));
            }
        } else if left <= right {
            let mut split = ClipRanges::new();
            for &(start, end) in ranges.iter() {
                if start < left {
                    split.push((start, end.min(left - 1)));
                }
                if end > right {
                    split.push((start.max(right + 1), end));
                }
            }
            ranges = split;
        }
    }

    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    const ENABLE: u16 = 1 << 13;

    fn planes(bounds: &[(u16, u16)]) -> [ClipPlane; NUM_CLIP_PLANES] {
        let mut planes = [ClipPlane::default(); NUM_CLIP_PLANES];
        for (plane, &(left, right)) in planes.iter_mut().zip(bounds) {
            *plane = ClipPlane { left, right };
        }
        planes
    }

    fn ranges(mix: u16, bounds: &[(u16, u16)]) -> Vec<(u16, u16)> {
        resolve_clip_ranges(&planes(bounds), MixControl(ENABLE | mix)).to_vec()
    }

    #[test]
    fn no_planes_enabled_draws_full_line() {
        assert_eq!(ranges(0x0000, &[(10, 50)]), vec![(0, 319)]);
    }

    #[test]
    fn normal_plane_intersects() {
        assert_eq!(ranges(0x0100, &[(10, 50)]), vec![(10, 50)]);
    }

    #[test]
    fn inverted_plane_excludes() {
        assert_eq!(ranges(0x0110, &[(10, 50)]), vec![(0, 9), (51, 319)]);

        // Invert mode with a clear invert bit also inverts
        assert_eq!(ranges(0x1100, &[(10, 50)]), vec![(0, 9), (51, 319)]);
    }

    #[test]
    fn planes_combine() {
        // Plane 0 keeps 10-200, inverted plane 1 cuts 50-60 out of it
        assert_eq!(ranges(0x0320, &[(10, 200), (50, 60)]), vec![(10, 49), (61, 200)]);

        // Plane 2 keeps 100-150 of that
        assert_eq!(ranges(0x0720, &[(10, 200), (50, 60), (100, 150)]), vec![(100, 150)]);
    }

    #[test]
    fn empty_planes() {
        // l > r: a normal plane hides everything, an inverted plane hides nothing
        assert_eq!(ranges(0x0100, &[(60, 50)]), vec![]);
        assert_eq!(ranges(0x0110, &[(60, 50)]), vec![(0, 319)]);
    }

    #[test]
    fn bounds_beyond_screen_are_clamped() {
        assert_eq!(ranges(0x0100, &[(300, 0x1FF)]), vec![(300, 319)]);
        assert_eq!(ranges(0x0100, &[(0x140, 0x1FF)]), vec![]);
        assert_eq!(ranges(0x0110, &[(0, 0x1FF)]), vec![]);
    }
}
