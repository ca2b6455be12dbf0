#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingUsage {
    Color,
    Elevation,
    Shared,
}

/// Where a tile texture is bound when the tile is drawn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SamplerBinding {
    pub usage: BindingUsage,
    pub unit: u32,
    pub sampler_name: String,
    pub matrix_name: String,
}

/// The engine's binding table. Owned by the render side and handed to
/// each tile merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderBindings {
    bindings: Vec<SamplerBinding>,
}

impl Default for RenderBindings {
    fn default() -> Self {
        let mut b = Self::empty();
        b.push(BindingUsage::Color, 0, "rex_color_tex", "rex_color_tex_matrix");
        b.push(
            BindingUsage::Elevation,
            1,
            "rex_elevation_tex",
            "rex_elevation_tex_matrix",
        );
        b
    }
}

impl RenderBindings {
    pub fn empty() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    pub fn push(&mut self, usage: BindingUsage, unit: u32, sampler: &str, matrix: &str) {
        self.bindings.retain(|b| b.usage != usage);
        self.bindings.push(SamplerBinding {
            usage,
            unit,
            sampler_name: sampler.to_string(),
            matrix_name: matrix.to_string(),
        });
    }

    pub fn get(&self, usage: BindingUsage) -> Option<&SamplerBinding> {
        self.bindings.iter().find(|b| b.usage == usage)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SamplerBinding> {
        self.bindings.iter()
    }
}
