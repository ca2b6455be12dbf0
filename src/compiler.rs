use hashbrown::HashSet;
use rex_model::{GpuResource, ResourceId};
use rex_scene::GpuCompiler;

/// Stand-in for a GPU uploader: records what would have been uploaded.
#[derive(Default)]
pub struct CountingCompiler {
    seen: HashSet<ResourceId>,
    uploads: u64,
    duplicates: u64,
    bytes: u64,
}

impl CountingCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    /// Resources handed over more than once.
    #[inline]
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    #[inline]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl GpuCompiler for CountingCompiler {
    fn compile(&mut self, resource: &GpuResource) {
        if !self.seen.insert(resource.id()) {
            self.duplicates += 1;
            return;
        }
        self.uploads += 1;
        self.bytes += resource.byte_len() as u64;
    }
}
