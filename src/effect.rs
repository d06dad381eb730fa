//! Effect-processor trampoline.
//!
//! A C function pointer plus user-data pointer can be attached to any sound
//! or music voice. The trampoline runs on the device thread, handing the
//! callback blocks of interleaved samples and forwarding the frame counts
//! the callback reports without interpretation. Both scratch buffers are
//! sized when the processor is attached; the device-thread path never
//! allocates.

use std::os::raw::c_void;

/// Per-block audio callback.
///
/// - `input`: interleaved input samples
/// - `input_frame_count`: in: frames available; out: frames consumed
/// - `output`: interleaved output buffer
/// - `output_frame_count`: in: output capacity in frames; out: frames produced
/// - `channel_count`: channels per frame
/// - `user_data`: pointer registered at attach time, passed through verbatim
///
/// The callback is invoked on the engine's audio thread. It must not
/// allocate, block, or call back into the library, and must not write more
/// than the given capacity.
pub type LyraEffectProcessor = Option<
    unsafe extern "C" fn(
        input: *const f32,
        input_frame_count: *mut u32,
        output: *mut f32,
        output_frame_count: *mut u32,
        channel_count: u32,
        user_data: *mut c_void,
    ),
>;

type EffectFn = unsafe extern "C" fn(
    *const f32,
    *mut u32,
    *mut f32,
    *mut u32,
    u32,
    *mut c_void,
);

/// Function pointer + user data captured at attach time.
///
/// Sent to the device thread; the C caller guarantees the callback and its
/// user data tolerate being invoked from there.
#[derive(Clone, Copy)]
pub(crate) struct EffectHook {
    pub proc_fn: EffectFn,
    pub user_data: *mut c_void,
}

unsafe impl Send for EffectHook {}
unsafe impl Sync for EffectHook {}

/// Upstream sample source an effect stage pulls from.
pub(crate) trait RawSource {
    fn next_raw(&mut self) -> Option<f32>;
}

/// Block-processing stage wrapping one [`EffectHook`].
pub(crate) struct EffectStage {
    hook: EffectHook,
    channels: usize,
    input: Vec<f32>,
    in_len: usize,
    output: Vec<f32>,
    out_len: usize,
    out_pos: usize,
}

const EFFECT_BLOCK_FRAMES: usize = 512;

impl EffectStage {
    pub(crate) fn new(hook: EffectHook, channels: u16) -> Self {
        let channels = channels.max(1) as usize;
        Self {
            hook,
            channels,
            input: vec![0.0; EFFECT_BLOCK_FRAMES * channels],
            in_len: 0,
            output: vec![0.0; EFFECT_BLOCK_FRAMES * channels],
            out_len: 0,
            out_pos: 0,
        }
    }

    /// Pull one processed sample, refilling from `src` block-wise.
    pub(crate) fn pop<S: RawSource>(&mut self, src: &mut S) -> Option<f32> {
        loop {
            if self.out_pos < self.out_len {
                let v = self.output[self.out_pos];
                self.out_pos += 1;
                return Some(v);
            }

            while self.in_len < self.input.len() {
                match src.next_raw() {
                    Some(v) => {
                        self.input[self.in_len] = v;
                        self.in_len += 1;
                    }
                    None => break,
                }
            }
            if self.in_len < self.channels {
                return None;
            }

            let mut in_frames = (self.in_len / self.channels) as u32;
            let mut out_frames = (self.output.len() / self.channels) as u32;
            unsafe {
                (self.hook.proc_fn)(
                    self.input.as_ptr(),
                    &mut in_frames,
                    self.output.as_mut_ptr(),
                    &mut out_frames,
                    self.channels as u32,
                    self.hook.user_data,
                )
            };

            let consumed = (in_frames as usize * self.channels).min(self.in_len);
            self.input.copy_within(consumed..self.in_len, 0);
            self.in_len -= consumed;
            self.out_len = (out_frames as usize * self.channels).min(self.output.len());
            self.out_pos = 0;

            if self.out_len == 0 && consumed == 0 {
                // The callback made no progress; treat the stream as ended.
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ramp {
        values: Vec<f32>,
        pos: usize,
    }

    impl RawSource for Ramp {
        fn next_raw(&mut self) -> Option<f32> {
            let v = self.values.get(self.pos).copied();
            self.pos += 1;
            v
        }
    }

    struct Record {
        calls: u32,
        last_in_frames: u32,
        last_out_capacity: u32,
        last_channels: u32,
    }

    /// Doubles every sample and consumes/produces everything it is given.
    unsafe extern "C" fn doubling_processor(
        input: *const f32,
        input_frame_count: *mut u32,
        output: *mut f32,
        output_frame_count: *mut u32,
        channel_count: u32,
        user_data: *mut c_void,
    ) {
        let record = unsafe { &mut *(user_data as *mut Record) };
        record.calls += 1;
        record.last_in_frames = unsafe { *input_frame_count };
        record.last_out_capacity = unsafe { *output_frame_count };
        record.last_channels = channel_count;

        let frames = unsafe { (*input_frame_count).min(*output_frame_count) };
        let samples = (frames * channel_count) as usize;
        for i in 0..samples {
            unsafe { *output.add(i) = *input.add(i) * 2.0 };
        }
        unsafe {
            *input_frame_count = frames;
            *output_frame_count = frames;
        }
    }

    /// Consumes everything and produces nothing, i.e. swallows the stream.
    unsafe extern "C" fn muting_processor(
        _input: *const f32,
        _input_frame_count: *mut u32,
        _output: *mut f32,
        output_frame_count: *mut u32,
        _channel_count: u32,
        _user_data: *mut c_void,
    ) {
        unsafe { *output_frame_count = 0 };
    }

    #[test]
    fn forwards_counts_and_processes_blocks() {
        let mut record = Record {
            calls: 0,
            last_in_frames: 0,
            last_out_capacity: 0,
            last_channels: 0,
        };
        let hook = EffectHook {
            proc_fn: doubling_processor,
            user_data: &mut record as *mut Record as *mut c_void,
        };

        let values: Vec<f32> = (0..12).map(|i| i as f32).collect();
        let mut src = Ramp {
            values: values.clone(),
            pos: 0,
        };
        let mut stage = EffectStage::new(hook, 2);

        let mut out = Vec::new();
        while let Some(v) = stage.pop(&mut src) {
            out.push(v);
        }

        let expected: Vec<f32> = values.iter().map(|v| v * 2.0).collect();
        assert_eq!(out, expected);
        assert_eq!(record.calls, 1);
        assert_eq!(record.last_in_frames, 6);
        assert_eq!(record.last_out_capacity, EFFECT_BLOCK_FRAMES as u32);
        assert_eq!(record.last_channels, 2);
    }

    #[test]
    fn zero_progress_ends_the_stream() {
        let hook = EffectHook {
            proc_fn: muting_processor,
            user_data: std::ptr::null_mut(),
        };
        let mut src = Ramp {
            values: vec![1.0; 8],
            pos: 0,
        };
        let mut stage = EffectStage::new(hook, 1);
        assert_eq!(stage.pop(&mut src), None);
    }
}
