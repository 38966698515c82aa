// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use glam::{Quat, Vec3};

/// How close to a whole number a frame has to be to count as one.
pub const FRAME_EPSILON: f32 = 1e-5;

/// A bone's location and rotation at one point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BonePose {
    pub location: Vec3,
    pub rotation: Quat,
}

impl BonePose {
    pub const IDENTITY: BonePose = BonePose {
        location: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// Linear for the location, spherical for the rotation.
    pub fn interpolate(&self, other: &BonePose, factor: f32) -> BonePose {
        BonePose {
            location: self.location.lerp(other.location, factor),
            rotation: self.rotation.slerp(other.rotation, factor).normalize(),
        }
    }

    /// Reads a `(qw, qx, qy, qz, lx, ly, lz)` element.
    pub fn from_data(data: &[f32; 7]) -> BonePose {
        BonePose {
            rotation: Quat::from_xyzw(data[1], data[2], data[3], data[0]),
            location: Vec3::new(data[4], data[5], data[6]),
        }
    }

    pub fn to_data(&self) -> [f32; 7] {
        [
            self.rotation.w,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
            self.location.x,
            self.location.y,
            self.location.z,
        ]
    }
}

/// Returns the whole frame `frame` is on, if it is within [`FRAME_EPSILON`] of one.
pub fn whole_frame(frame: f32) -> Option<i32> {
    let rounded = frame.round();
    if (frame - rounded).abs() <= FRAME_EPSILON {
        Some(rounded as i32)
    } else {
        None
    }
}

/// The frames an exported sequence is sampled at: `frame_count` frames from `frame_start`, `step` apart.
///
/// The last frame is pinned to `frame_end` so accumulated error never leaves the source range.
pub fn sequence_frames(frame_start: f32, frame_end: f32, frame_count: usize) -> Vec<f32> {
    if frame_count <= 1 {
        return vec![frame_start];
    }

    let step = (frame_end - frame_start) / (frame_count - 1) as f32;
    let mut frames: Vec<f32> = (0..frame_count)
        .map(|i| frame_start + step * i as f32)
        .collect();
    if let Some(last) = frames.last_mut() {
        *last = frame_end;
    }
    frames
}

/// The source times used to resample `frame_count` frames with `step` source frames per output frame.
///
/// Times run `0, step, 2 * step, ...` while they are before the last frame, which is always included.
pub fn resample_times(frame_count: usize, step: f32) -> Vec<f32> {
    if frame_count == 0 {
        return Vec::new();
    }

    let last = (frame_count - 1) as f32;
    let mut times = Vec::new();
    if step > 0.0 {
        let mut index = 0;
        loop {
            let time = step * index as f32;
            if time >= last - FRAME_EPSILON {
                break;
            }
            times.push(time);
            index += 1;
        }
    }
    times.push(last);
    times
}

/// The two whole frames around `time` and how far between them it is.
pub fn bracket(time: f32, frame_count: usize) -> (usize, usize, f32) {
    let last = frame_count.saturating_sub(1);
    let lower = (time.floor().max(0.0) as usize).min(last);
    let upper = (lower + 1).min(last);
    let factor = (time - lower as f32).clamp(0.0, 1.0);
    (lower, upper, factor)
}
