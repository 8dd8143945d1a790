use std::borrow::Cow;

use crate::error::GraphicsInitError;
use crate::renderer::GpuContext;
use crate::resources::ResourceProvider;

/// Every WGSL program the pipeline compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ShaderProgram {
    Geometry,
    Ssao,
    SsaoBlur,
    Lighting,
    Composite,
}

impl ShaderProgram {
    pub(crate) const ALL: [ShaderProgram; 5] = [
        ShaderProgram::Geometry,
        ShaderProgram::Ssao,
        ShaderProgram::SsaoBlur,
        ShaderProgram::Lighting,
        ShaderProgram::Composite,
    ];

    /// Identifier passed to the resource layer.
    pub(crate) fn name(self) -> &'static str {
        match self {
            ShaderProgram::Geometry => "geometry",
            ShaderProgram::Ssao => "ssao",
            ShaderProgram::SsaoBlur => "ssao_blur",
            ShaderProgram::Lighting => "lighting",
            ShaderProgram::Composite => "composite",
        }
    }
}

/// Shader modules resolved once at construction.
pub(crate) struct ShaderLibrary {
    modules: Vec<wgpu::ShaderModule>,
}

impl ShaderLibrary {
    pub(crate) fn load(
        context: &GpuContext,
        resources: &dyn ResourceProvider,
    ) -> Result<Self, GraphicsInitError> {
        let mut modules = Vec::with_capacity(ShaderProgram::ALL.len());
        for program in ShaderProgram::ALL {
            let source = resources
                .shader_source(program.name())
                .ok_or_else(|| GraphicsInitError::MissingShader(program.name().to_owned()))?;
            let module = context.validated(program.name(), |device| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(program.name()),
                    source: wgpu::ShaderSource::Wgsl(Cow::Owned(source.into_owned())),
                })
            })?;
            log::info!("Compiled shader program `{}`", program.name());
            modules.push(module);
        }
        Ok(Self { modules })
    }

    pub(crate) fn module(&self, program: ShaderProgram) -> &wgpu::ShaderModule {
        &self.modules[program as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_order_matches_discriminants() {
        for (index, program) in ShaderProgram::ALL.iter().enumerate() {
            assert_eq!(*program as usize, index);
        }
    }
}
