use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

impl ResourceId {
    pub fn next() -> Self {
        ResourceId(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
    R32F,
}

impl PixelFormat {
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 | PixelFormat::R32F => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Texture2D {
        width: u32,
        height: u32,
        format: PixelFormat,
    },
    Buffer,
}

/// CPU-side payload awaiting upload. Cloning shares the bytes.
#[derive(Clone, Debug)]
pub struct GpuResource {
    id: ResourceId,
    kind: ResourceKind,
    label: String,
    data: Arc<[u8]>,
}

impl GpuResource {
    pub fn texture(
        label: impl Into<String>,
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Self {
        debug_assert_eq!(
            data.len(),
            width as usize * height as usize * format.bytes_per_pixel()
        );
        Self {
            id: ResourceId::next(),
            kind: ResourceKind::Texture2D {
                width,
                height,
                format,
            },
            label: label.into(),
            data: data.into(),
        }
    }

    pub fn buffer(label: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id: ResourceId::next(),
            kind: ResourceKind::Buffer,
            label: label.into(),
            data: data.into(),
        }
    }

    #[inline]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}
