//! Software rendering context
//!
//! Keeps textures in host memory. Used by tests, tools and machines without a
//! GPU; enforces the same owning-thread and capacity rules as a real device.

use crate::context::{check_limits, GpuTexture, RenderContext, TextureId, TextureOptions};
use crate::error::RenderError;
use crate::pixels::PixelBuffer;
use crate::DeviceCapabilities;
use cinder_core::thread::OwnerThread;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct TextureRecord {
    pub width: u32,
    pub height: u32,
    pub options: TextureOptions,
    pub mip_levels: u32,
    pub bytes: usize,
    pub uploads: u32,
}

pub struct HeadlessContext {
    owner: OwnerThread,
    caps: DeviceCapabilities,
    next_id: TextureId,
    textures: HashMap<TextureId, TextureRecord>,
    created: u64,
    destroyed: u64,
}

impl HeadlessContext {
    /// Create a context owned by the calling thread.
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities::default())
    }

    pub fn with_capabilities(caps: DeviceCapabilities) -> Self {
        Self {
            owner: OwnerThread::current(),
            caps,
            next_id: 1,
            textures: HashMap::new(),
            created: 0,
            destroyed: 0,
        }
    }

    pub fn owner(&self) -> OwnerThread {
        self.owner
    }

    pub fn texture(&self, id: TextureId) -> Option<&TextureRecord> {
        self.textures.get(&id)
    }

    pub fn created_count(&self) -> u64 {
        self.created
    }

    pub fn destroyed_count(&self) -> u64 {
        self.destroyed
    }

    fn record(pixels: &PixelBuffer, mips: &[PixelBuffer], options: &TextureOptions) -> TextureRecord {
        TextureRecord {
            width: pixels.width(),
            height: pixels.height(),
            options: *options,
            mip_levels: 1 + mips.len() as u32,
            bytes: pixels.byte_len() + mips.iter().map(PixelBuffer::byte_len).sum::<usize>(),
            uploads: 1,
        }
    }
}

impl Default for HeadlessContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderContext for HeadlessContext {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.caps
    }

    fn create_texture(
        &mut self,
        pixels: &PixelBuffer,
        mips: &[PixelBuffer],
        options: &TextureOptions,
    ) -> Result<GpuTexture, RenderError> {
        self.owner.assert_current("HeadlessContext::create_texture");
        check_limits(&self.caps, pixels, self.textures.len())?;

        let id = self.next_id;
        self.next_id += 1;
        let record = Self::record(pixels, mips, options);
        let mip_levels = record.mip_levels;
        self.textures.insert(id, record);
        self.created += 1;
        tracing::trace!(id, width = pixels.width(), height = pixels.height(), "texture created");

        Ok(GpuTexture {
            id,
            width: pixels.width(),
            height: pixels.height(),
            format: pixels.format(),
            mip_levels,
        })
    }

    fn upload_texture(
        &mut self,
        texture: &mut GpuTexture,
        pixels: &PixelBuffer,
        mips: &[PixelBuffer],
        options: &TextureOptions,
    ) -> Result<(), RenderError> {
        self.owner.assert_current("HeadlessContext::upload_texture");
        // The texture already counts toward capacity.
        check_limits(&self.caps, pixels, 0)?;

        let previous = self
            .textures
            .get(&texture.id)
            .ok_or(RenderError::UnknownTexture(texture.id))?;
        let mut record = Self::record(pixels, mips, options);
        record.uploads = previous.uploads + 1;
        self.textures.insert(texture.id, record);

        texture.width = pixels.width();
        texture.height = pixels.height();
        texture.format = pixels.format();
        texture.mip_levels = 1 + mips.len() as u32;
        Ok(())
    }

    fn destroy_texture(&mut self, texture: GpuTexture) {
        self.owner.assert_current("HeadlessContext::destroy_texture");
        if self.textures.remove(&texture.id).is_some() {
            self.destroyed += 1;
            tracing::trace!(id = texture.id, "texture destroyed");
        } else {
            tracing::warn!(id = texture.id, "destroying unknown texture");
        }
    }

    fn live_textures(&self) -> usize {
        self.textures.len()
    }
}
