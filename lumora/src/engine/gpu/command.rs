use super::{BindGroupId, BufferId, PipelineId, TextureViewId};
use std::ops::Range;

/// One recorded render pass command.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    SetPipeline(PipelineId),
    SetBindGroup {
        index: u32,
        group: BindGroupId,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: BufferId,
    },
    SetIndexBuffer {
        buffer: BufferId,
        format: wgpu::IndexFormat,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
}

impl RenderCommand {
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            RenderCommand::Draw { .. } | RenderCommand::DrawIndexed { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    pub view: TextureViewId,
    /// `None` keeps whatever the target already contains.
    pub clear: Option<wgpu::Color>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachment {
    pub view: TextureViewId,
    pub clear: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDescriptor {
    pub label: String,
    pub color: ColorAttachment,
    pub depth: Option<DepthAttachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPass {
    pub desc: RenderPassDescriptor,
    pub commands: Vec<RenderCommand>,
}

impl RecordedPass {
    pub fn draw_count(&self) -> usize {
        self.commands.iter().filter(|c| c.is_draw()).count()
    }
}

/// Records the passes of one frame. Nothing reaches the device until the finished
/// [`CommandBuffer`] is submitted.
#[derive(Debug)]
pub struct FrameEncoder {
    label: String,
    passes: Vec<RecordedPass>,
}

impl FrameEncoder {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            passes: Vec::new(),
        }
    }

    /// Starts a pass. It ends when the recorder is dropped.
    pub fn begin_render_pass(&mut self, desc: RenderPassDescriptor) -> RenderPassRecorder<'_> {
        let index = self.passes.len();
        self.passes.push(RecordedPass {
            desc,
            commands: Vec::new(),
        });
        RenderPassRecorder {
            pass: &mut self.passes[index],
        }
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn finish(self) -> CommandBuffer {
        CommandBuffer {
            label: self.label,
            passes: self.passes,
        }
    }
}

pub struct RenderPassRecorder<'e> {
    pass: &'e mut RecordedPass,
}

impl RenderPassRecorder<'_> {
    pub fn set_pipeline(&mut self, pipeline: PipelineId) {
        self.pass.commands.push(RenderCommand::SetPipeline(pipeline));
    }

    pub fn set_bind_group(&mut self, index: u32, group: BindGroupId) {
        self.pass
            .commands
            .push(RenderCommand::SetBindGroup { index, group });
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId) {
        self.pass
            .commands
            .push(RenderCommand::SetVertexBuffer { slot, buffer });
    }

    pub fn set_index_buffer(&mut self, buffer: BufferId, format: wgpu::IndexFormat) {
        self.pass
            .commands
            .push(RenderCommand::SetIndexBuffer { buffer, format });
    }

    pub fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.pass.commands.push(RenderCommand::Draw {
            vertices,
            instances,
        });
    }

    pub fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.pass.commands.push(RenderCommand::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }
}

/// A finished, immutable frame recording.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandBuffer {
    label: String,
    passes: Vec<RecordedPass>,
}

impl CommandBuffer {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn passes(&self) -> &[RecordedPass] {
        &self.passes
    }

    pub fn draw_count(&self) -> usize {
        self.passes.iter().map(RecordedPass::draw_count).sum()
    }
}
