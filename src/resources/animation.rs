//! Node animation clips.
//!
//! Channels are read once at load time. Sampling picks the keyframe pair
//! around the requested time and interpolates: linear for translation and
//! scale, spherical for rotation.

use std::borrow::Cow;

use cgmath::{InnerSpace, Quaternion, Vector3, VectorSpace};

use crate::data_structures::instance::Transform;

#[derive(Clone, Debug)]
pub enum Keyframes {
    Translation(Vec<Vector3<f32>>),
    Rotation(Vec<Quaternion<f32>>),
    Scale(Vec<Vector3<f32>>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    Step,
}

/// Keyframes driving one property of one node.
#[derive(Clone, Debug)]
pub struct AnimationChannel {
    /// Index of the target node in the glTF document.
    pub node: usize,
    pub keyframes: Keyframes,
    pub timestamps: Vec<f32>,
    pub interpolation: Interpolation,
}

#[derive(Clone, Debug)]
pub struct AnimationClip {
    pub name: String,
    pub channels: Vec<AnimationChannel>,
    /// Time of the last keyframe over all channels, in seconds.
    pub duration: f32,
}

/// A single property written by a channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PoseUpdate {
    Translation(Vector3<f32>),
    Rotation(Quaternion<f32>),
    Scale(Vector3<f32>),
}

impl PoseUpdate {
    pub fn apply_to(self, transform: &mut Transform) {
        match self {
            Self::Translation(position) => transform.position = position,
            Self::Rotation(rotation) => transform.rotation = rotation,
            Self::Scale(scale) => transform.scale = scale,
        }
    }
}

impl AnimationClip {
    /// Evaluate every channel at `time` and hand the results to `apply`
    /// together with the target node index. Time wraps around the clip
    /// duration.
    pub fn sample(&self, time: f32, mut apply: impl FnMut(usize, PoseUpdate)) {
        let time = if self.duration > 0.0 {
            time.rem_euclid(self.duration)
        } else {
            0.0
        };
        for channel in &self.channels {
            let Some((i, j, t)) = channel.keyframe_pair(time) else {
                continue;
            };
            let update = match &channel.keyframes {
                Keyframes::Translation(values) => {
                    PoseUpdate::Translation(values[i].lerp(values[j], t))
                }
                Keyframes::Scale(values) => PoseUpdate::Scale(values[i].lerp(values[j], t)),
                Keyframes::Rotation(values) if i == j => PoseUpdate::Rotation(values[i]),
                Keyframes::Rotation(values) => {
                    PoseUpdate::Rotation(values[i].slerp(values[j], t).normalize())
                }
            };
            apply(channel.node, update);
        }
    }
}

impl AnimationChannel {
    fn len(&self) -> usize {
        let values = match &self.keyframes {
            Keyframes::Translation(v) | Keyframes::Scale(v) => v.len(),
            Keyframes::Rotation(v) => v.len(),
        };
        values.min(self.timestamps.len())
    }

    /// Indices of the keyframes surrounding `time` and the blend factor
    /// between them.
    fn keyframe_pair(&self, time: f32) -> Option<(usize, usize, f32)> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        let times = &self.timestamps[..len];
        let next = times.partition_point(|&t| t <= time);
        if next == 0 {
            return Some((0, 0, 0.0));
        }
        if next == len {
            return Some((len - 1, len - 1, 0.0));
        }
        let prev = next - 1;
        match self.interpolation {
            Interpolation::Step => Some((prev, prev, 0.0)),
            Interpolation::Linear => {
                let span = times[next] - times[prev];
                let t = if span > 0.0 {
                    (time - times[prev]) / span
                } else {
                    0.0
                };
                Some((prev, next, t))
            }
        }
    }
}

/// Read every animation of the document. Morph target channels are skipped.
pub fn load_animations(
    document: &gltf::Document,
    buffers: &[Cow<'_, [u8]>],
) -> Vec<AnimationClip> {
    document
        .animations()
        .map(|animation| {
            let name = animation
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("animation{}", animation.index()));
            let channels: Vec<AnimationChannel> = animation
                .channels()
                .filter_map(|channel| read_channel(&name, &channel, buffers))
                .collect();
            let duration = channels
                .iter()
                .filter_map(|c| c.timestamps.last().copied())
                .fold(0.0_f32, f32::max);
            AnimationClip {
                name,
                channels,
                duration,
            }
        })
        .collect()
}

fn read_channel(
    clip: &str,
    channel: &gltf::animation::Channel<'_>,
    buffers: &[Cow<'_, [u8]>],
) -> Option<AnimationChannel> {
    let reader = channel.reader(|buffer| buffers.get(buffer.index()).map(|b| b.as_ref()));
    let Some(timestamps) = reader.read_inputs().map(|inputs| inputs.collect::<Vec<f32>>()) else {
        log::warn!("No timestamps in channel {} of {}", channel.index(), clip);
        return None;
    };

    let interpolation = match channel.sampler().interpolation() {
        gltf::animation::Interpolation::Linear => Interpolation::Linear,
        gltf::animation::Interpolation::Step => Interpolation::Step,
        gltf::animation::Interpolation::CubicSpline => {
            log::warn!(
                "Channel {} of {} uses cubic spline interpolation; sampling it linearly.",
                channel.index(),
                clip
            );
            Interpolation::Linear
        }
    };
    // Cubic spline outputs are (in-tangent, value, out-tangent) triples.
    let stride = match channel.sampler().interpolation() {
        gltf::animation::Interpolation::CubicSpline => 3,
        _ => 1,
    };
    let pick = |i: usize| stride == 1 || i % 3 == 1;

    use gltf::animation::util::ReadOutputs;
    let keyframes = match reader.read_outputs()? {
        ReadOutputs::Translations(values) => Keyframes::Translation(
            values
                .enumerate()
                .filter(|(i, _)| pick(*i))
                .map(|(_, v)| v.into())
                .collect(),
        ),
        ReadOutputs::Rotations(values) => Keyframes::Rotation(
            values
                .into_f32()
                .enumerate()
                .filter(|(i, _)| pick(*i))
                .map(|(_, [x, y, z, w])| Quaternion::new(w, x, y, z))
                .collect(),
        ),
        ReadOutputs::Scales(values) => Keyframes::Scale(
            values
                .enumerate()
                .filter(|(i, _)| pick(*i))
                .map(|(_, v)| v.into())
                .collect(),
        ),
        ReadOutputs::MorphTargetWeights(_) => {
            log::warn!("Morph target channel {} of {} is ignored.", channel.index(), clip);
            return None;
        }
    };

    Some(AnimationChannel {
        node: channel.target().node().index(),
        keyframes,
        timestamps,
        interpolation,
    })
}
