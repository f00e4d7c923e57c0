//! Command replay and the simulated timeline for the Null backend

use super::resource::stale_handle;
use super::*;
use crate::{Command, GraphicsError};

impl Context {
    fn replay(&self, commands: &[Command]) -> Result<(), GraphicsError> {
        let mut hub = self.hub.write().unwrap();
        let mut stats = self.stats.lock().unwrap();
        stats.submissions += 1;
        stats.commands += commands.len() as u64;
        for command in commands {
            match *command {
                Command::BeginRenderPass(_) => stats.passes_begun += 1,
                Command::EndRenderPass => stats.passes_ended += 1,
                Command::Draw { .. }
                | Command::DrawIndexed { .. }
                | Command::DrawIndirect { .. }
                | Command::DrawIndexedIndirect { .. } => stats.draws += 1,
                Command::Dispatch { .. } => stats.dispatches += 1,
                Command::CopyBufferToBuffer {
                    src,
                    src_offset,
                    dst,
                    dst_offset,
                    size,
                } => {
                    let src_range = src_offset as usize..(src_offset + size) as usize;
                    let chunk = hub
                        .buffers
                        .get(src.raw)
                        .ok_or_else(|| stale_handle("buffer"))?
                        .data[src_range]
                        .to_vec();
                    let target = hub
                        .buffers
                        .get_mut(dst.raw)
                        .ok_or_else(|| stale_handle("buffer"))?;
                    let start = dst_offset as usize;
                    target.data[start..start + chunk.len()].copy_from_slice(&chunk);
                    stats.copies += 1;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[hidden_trait::expose]
impl crate::traits::CommandDevice for Context {
    fn submit(&self, queue: QueueType, commands: &[Command]) -> Result<(), GraphicsError> {
        log::trace!("Null {:?} submission of {} commands", queue, commands.len());
        self.replay(commands)
    }

    fn signal(&self, queue: QueueType, value: u64) {
        let timeline = &self.timelines[queue as usize];
        let mut state = timeline.state.lock().unwrap();
        state.signaled = state.signaled.max(value);
        if !state.paused {
            state.completed = state.signaled;
            timeline.condvar.notify_all();
        }
    }

    fn completed_value(&self, queue: QueueType) -> u64 {
        self.timelines[queue as usize].state.lock().unwrap().completed
    }

    fn wait(&self, queue: QueueType, value: u64) -> Result<(), GraphicsError> {
        let timeline = &self.timelines[queue as usize];
        let mut state = timeline.state.lock().unwrap();
        if value > state.signaled {
            return Err(GraphicsError::native(
                crate::Backend::Null,
                -1,
                format!("{:?} fence {:#x} was never signaled", queue, value),
            ));
        }
        while state.completed < value {
            state = timeline.condvar.wait(state).unwrap();
        }
        Ok(())
    }
}
