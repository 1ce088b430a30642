//! Recorded GPU command sequences.
//!
//! A sequence is plain data: it names textures through [`TextureRef`] and is
//! turned into real wgpu calls by `LodSimulation::encode_frame`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Logical texture handle, resolved against the per-level textures at encode time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureRef {
    PingPongSource(usize),
    PingPongTarget(usize),
    Result(usize),
    /// 1x1 all-black texture.
    Zero,
}

/// Point in the frame a sequence is attached to. All `Simulate` sequences run
/// before any `Composite` sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineEvent {
    Simulate,
    Composite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Draw the level's raster quad with its simulation material into its ping-pong target.
    Advance { lod: usize },
    /// Draw the level's copy source into `dest` with the copy material. The
    /// source comes from the level's copy parameters at encode time.
    Blit { lod: usize, dest: TextureRef },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceId(u64);

static NEXT_SEQUENCE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct CommandSequence {
    id: SequenceId,
    label: String,
    event: PipelineEvent,
    commands: Vec<Command>,
    recordings: u64,
}

impl CommandSequence {
    pub fn new(label: impl Into<String>, event: PipelineEvent) -> Self {
        Self {
            id: SequenceId(NEXT_SEQUENCE_ID.fetch_add(1, Ordering::Relaxed)),
            label: label.into(),
            event,
            commands: Vec::new(),
            recordings: 0,
        }
    }

    pub fn id(&self) -> SequenceId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn event(&self) -> PipelineEvent {
        self.event
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of times the sequence content has been (re)recorded.
    pub fn recordings(&self) -> u64 {
        self.recordings
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Replace the sequence content.
    pub fn record(&mut self, commands: impl IntoIterator<Item = Command>) {
        self.commands.clear();
        self.commands.extend(commands);
        self.recordings += 1;
    }
}
