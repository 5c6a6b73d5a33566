//! GLSL loading, wrapping, validation and stage-interface checks.
//!
//! Scene fragment shaders follow the ShaderToy convention and only define
//! `mainImage(out vec4, in vec2)`. [`prepare_source`] wraps them with a
//! prelude that declares the scene uniform block and a `main` that calls
//! `mainImage`. Every source is parsed and validated with naga on the CPU
//! before a GPU module is created, so failures come back as diagnostics
//! instead of device errors.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;

use wgpu::naga;

/// Uniform names provided by the prelude; user declarations of these are
/// stripped.
const PROVIDED_UNIFORMS: [&str; 4] = ["iResolution", "iTimeDelta", "iTime", "iFrame"];

/// Group and binding of the scene uniform block.
pub const SCENE_UNIFORM_BINDING: (u32, u32) = (0, 0);

/// Vertex attribute locations supplied by the quad geometry.
const QUAD_ATTRIBUTE_LOCATIONS: [u32; 2] = [0, 1];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub(crate) fn to_naga(self) -> naga::ShaderStage {
        match self {
            Self::Vertex => naga::ShaderStage::Vertex,
            Self::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{stage} shader failed to compile:\n{log}")]
pub struct CompileError {
    pub stage: ShaderStage,
    pub log: String,
}

impl CompileError {
    pub(crate) fn new(stage: ShaderStage, log: impl Into<String>) -> Self {
        Self {
            stage,
            log: log.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("fragment input at location {location} is not written by the vertex shader")]
    MissingVarying { location: u32 },
    #[error(
        "fragment input at location {location} is {fragment} but the vertex shader writes {vertex}"
    )]
    VaryingMismatch {
        location: u32,
        vertex: String,
        fragment: String,
    },
    #[error("vertex input at location {location} is not supplied by the quad (expected vec2 at location 0 or 1)")]
    UnsupportedVertexInput { location: u32 },
    #[error("{stage} shader uses group {group} binding {binding}; only the scene uniform block (0, 0) is bound")]
    UnsupportedBinding {
        stage: ShaderStage,
        group: u32,
        binding: u32,
    },
    #[error("pipeline creation failed: {0}")]
    Pipeline(String),
}

/// Reads a shader file. Unreadable files yield empty text, which the
/// compiler then rejects.
pub fn load_shader_source(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to read shader source");
            String::new()
        }
    }
}

/// A user-facing location/type pair crossing a stage boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Varying {
    pub location: u32,
    pub ty: naga::TypeInner,
}

/// What an entry point consumes and produces, as seen by the linker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderInterface {
    pub inputs: Vec<Varying>,
    pub outputs: Vec<Varying>,
    /// `(group, binding)` of every bound global resource.
    pub bindings: Vec<(u32, u32)>,
}

/// Source that passed naga validation, ready to become a GPU module.
#[derive(Debug, Clone)]
pub struct ParsedShader {
    pub stage: ShaderStage,
    pub source: String,
    pub interface: ShaderInterface,
}

/// Produces the final GLSL for `stage`. Fragment scenes are wrapped with the
/// ShaderToy prelude; vertex sources pass through unchanged.
pub fn prepare_source(source: &str, stage: ShaderStage) -> Result<String, CompileError> {
    if source.trim().is_empty() {
        return Err(CompileError::new(stage, "shader source is empty"));
    }
    Ok(match stage {
        ShaderStage::Vertex => source.to_string(),
        ShaderStage::Fragment => wrap_scene_fragment(source),
    })
}

/// Wraps, parses and validates `source` against naga's baseline
/// capabilities.
pub fn parse_shader(source: &str, stage: ShaderStage) -> Result<ParsedShader, CompileError> {
    parse_shader_with(source, stage, naga::valid::Capabilities::default())
}

/// Like [`parse_shader`], but only accepts the shader features in
/// `capabilities`. Pass what the device supports so that a shader the GPU
/// cannot run fails here instead of at module creation.
pub fn parse_shader_with(
    source: &str,
    stage: ShaderStage,
    capabilities: naga::valid::Capabilities,
) -> Result<ParsedShader, CompileError> {
    let prepared = prepare_source(source, stage)?;

    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options::from(stage.to_naga());
    let module = frontend
        .parse(&options, &prepared)
        .map_err(|errors| CompileError::new(stage, errors.emit_to_string(&prepared)))?;

    let mut validator =
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), capabilities);
    validator
        .validate(&module)
        .map_err(|err| CompileError::new(stage, err.emit_to_string(&prepared)))?;

    let interface = entry_interface(&module, stage.to_naga());
    Ok(ParsedShader {
        stage,
        source: prepared,
        interface,
    })
}

/// Checks that `vertex` and `fragment` can form one program over the quad
/// geometry and the scene uniform block.
pub fn check_interface(
    vertex: &ShaderInterface,
    fragment: &ShaderInterface,
) -> Result<(), LinkError> {
    for input in &vertex.inputs {
        if !QUAD_ATTRIBUTE_LOCATIONS.contains(&input.location) || input.ty != vec2_f32() {
            return Err(LinkError::UnsupportedVertexInput {
                location: input.location,
            });
        }
    }

    for input in &fragment.inputs {
        let Some(output) = vertex
            .outputs
            .iter()
            .find(|output| output.location == input.location)
        else {
            return Err(LinkError::MissingVarying {
                location: input.location,
            });
        };
        if output.ty != input.ty {
            return Err(LinkError::VaryingMismatch {
                location: input.location,
                vertex: format!("{:?}", output.ty),
                fragment: format!("{:?}", input.ty),
            });
        }
    }

    for (stage, interface) in [
        (ShaderStage::Vertex, vertex),
        (ShaderStage::Fragment, fragment),
    ] {
        if let Some(&(group, binding)) = interface
            .bindings
            .iter()
            .find(|&&slot| slot != SCENE_UNIFORM_BINDING)
        {
            return Err(LinkError::UnsupportedBinding {
                stage,
                group,
                binding,
            });
        }
    }

    Ok(())
}

fn vec2_f32() -> naga::TypeInner {
    naga::TypeInner::Vector {
        size: naga::VectorSize::Bi,
        scalar: naga::Scalar::F32,
    }
}

fn entry_interface(module: &naga::Module, stage: naga::ShaderStage) -> ShaderInterface {
    let mut interface = ShaderInterface::default();
    if let Some(entry) = module.entry_points.iter().find(|entry| entry.stage == stage) {
        for argument in &entry.function.arguments {
            collect_varyings(
                module,
                argument.ty,
                argument.binding.as_ref(),
                &mut interface.inputs,
            );
        }
        if let Some(result) = &entry.function.result {
            collect_varyings(
                module,
                result.ty,
                result.binding.as_ref(),
                &mut interface.outputs,
            );
        }
    }
    interface.bindings = module
        .global_variables
        .iter()
        .filter_map(|(_, global)| global.binding.as_ref())
        .map(|binding| (binding.group, binding.binding))
        .collect();
    interface
}

fn collect_varyings(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut Vec<Varying>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => out.push(Varying {
            location: *location,
            ty: module.types[ty].inner.clone(),
        }),
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_varyings(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

/// Produces a self-contained GLSL fragment shader from a ShaderToy-style
/// scene: strips `#version` and the uniforms the prelude provides, prepends
/// [`HEADER`], appends [`FOOTER`].
pub fn wrap_scene_fragment(source: &str) -> String {
    let mut sanitized = String::new();
    let mut skipped_version = false;
    for line in source.lines() {
        let trimmed = line.trim_start();
        if !skipped_version && trimmed.starts_with("#version") {
            skipped_version = true;
            continue;
        }
        if declared_uniform(trimmed).is_some_and(|name| PROVIDED_UNIFORMS.contains(&name)) {
            continue;
        }
        sanitized.push_str(line);
        sanitized.push('\n');
    }

    format!("{HEADER}\n#line 1\n{sanitized}{FOOTER}")
}

/// Name declared by a single-line `uniform <type> <name>;` statement.
fn declared_uniform(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("uniform")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let declarator = rest.split(';').next()?.split_whitespace().last()?;
    declarator.split('[').next()
}

/// GLSL prologue injected ahead of every scene. The block layout must match
/// `SceneUniforms` in `gpu/uniforms.rs`.
const HEADER: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform SceneParams {
    vec3 _iResolution;
    float _iTime;
    float _iTimeDelta;
    int _iFrame;
    vec2 _padding0;
} ubo;

#define iResolution ubo._iResolution
#define iTime ubo._iTime
#define iTimeDelta ubo._iTimeDelta
#define iFrame ubo._iFrame
";

/// Flips `gl_FragCoord` to a bottom-left origin and delegates to `mainImage`.
const FOOTER: &str = r"
void main() {
    vec2 fragCoord = vec2(gl_FragCoord.x, iResolution.y - gl_FragCoord.y);
    vec4 color = vec4(0.0, 0.0, 0.0, 1.0);
    mainImage(color, fragCoord);
    outColor = vec4(color.rgb, 1.0);
}
";

/// Vertex shader used when the configured one fails to compile. Consumes the
/// quad's position and uv attributes.
pub const FALLBACK_VERTEX_GLSL: &str = r"#version 450
layout(location = 0) in vec2 a_position;
layout(location = 1) in vec2 a_uv;
layout(location = 0) out vec2 v_uv;

void main() {
    v_uv = a_uv;
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

/// Scene substituted for one that failed to compile or link: a slowly
/// scrolling magenta checkerboard.
pub const FALLBACK_SCENE_GLSL: &str = r"
void mainImage(out vec4 fragColor, in vec2 fragCoord) {
    vec2 cell = floor((fragCoord + vec2(iTime * 20.0, 0.0)) / 24.0);
    float checker = mod(cell.x + cell.y, 2.0);
    fragColor = vec4(mix(vec3(0.08), vec3(0.9, 0.1, 0.7), checker), 1.0);
}
";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ShaderKey {
    stage: ShaderStage,
    hash: u64,
}

impl ShaderKey {
    fn new(source: &str, stage: ShaderStage) -> Self {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        Self {
            stage,
            hash: hasher.finish(),
        }
    }
}

/// Start-up cache of compiled shader handles keyed by stage and source hash.
///
/// Identical sources (most importantly the shared vertex shader) are parsed
/// and uploaded once. Failures are cached too, so a broken source is only
/// reported once. Drop the cache once every program has been linked.
#[derive(Debug)]
pub struct ShaderCache<H> {
    capabilities: naga::valid::Capabilities,
    entries: HashMap<ShaderKey, Result<H, CompileError>>,
}

impl<H: Clone> ShaderCache<H> {
    pub fn new() -> Self {
        Self::with_capabilities(naga::valid::Capabilities::default())
    }

    /// A cache that validates against `capabilities` instead of the baseline.
    pub fn with_capabilities(capabilities: naga::valid::Capabilities) -> Self {
        Self {
            capabilities,
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the cached handle for `source`, or validates it and turns the
    /// parsed shader into a handle with `build`.
    pub fn compile_with(
        &mut self,
        source: &str,
        stage: ShaderStage,
        build: impl FnOnce(ParsedShader) -> Result<H, CompileError>,
    ) -> Result<H, CompileError> {
        let key = ShaderKey::new(source, stage);
        if let Some(entry) = self.entries.get(&key) {
            tracing::trace!(%stage, "shader cache hit");
            return entry.clone();
        }
        let entry = parse_shader_with(source, stage, self.capabilities).and_then(build);
        self.entries.insert(key, entry.clone());
        entry
    }
}

impl<H: Clone> Default for ShaderCache<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLED_VERTEX: &str = include_str!("../../../shader/vertex.glsl");
    const BUNDLED_SCENES: [&str; 3] = [
        include_str!("../../../shader/scenes/scene1.glsl"),
        include_str!("../../../shader/scenes/scene2.glsl"),
        include_str!("../../../shader/scenes/scene3.glsl"),
    ];

    #[test]
    fn wrap_strips_version_and_provided_uniforms() {
        let source = r#"
            #version 330 core
            uniform float iTime;
            uniform vec2 iResolution;
            uniform float userGain;
            void mainImage(out vec4 fragColor, in vec2 fragCoord) {
                fragColor = vec4(fragCoord, 0.0, 1.0);
            }
        "#;

        let wrapped = wrap_scene_fragment(source);
        assert!(!wrapped.contains("#version 330"));
        assert!(!wrapped.contains("uniform float iTime"));
        assert!(!wrapped.contains("uniform vec2 iResolution"));
        assert!(wrapped.contains("uniform float userGain"));
        assert!(wrapped.starts_with("#version 450"));
        assert!(wrapped.contains("mainImage(color, fragCoord)"));
    }

    #[test]
    fn empty_source_fails_to_compile() {
        for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
            let err = parse_shader("  \n\t", stage).unwrap_err();
            assert_eq!(err.stage, stage);
            assert!(err.log.contains("empty"));
        }
    }

    #[test]
    fn syntax_errors_are_reported_with_stage() {
        let err = parse_shader(
            "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0) }",
            ShaderStage::Fragment,
        )
        .unwrap_err();
        assert_eq!(err.stage, ShaderStage::Fragment);
        assert!(!err.log.is_empty());
    }

    #[test]
    fn bundled_shaders_compile_and_link() {
        let vertex = parse_shader(BUNDLED_VERTEX, ShaderStage::Vertex).unwrap();
        assert_eq!(vertex.interface.inputs.len(), 2);
        for scene in BUNDLED_SCENES {
            let fragment = parse_shader(scene, ShaderStage::Fragment).unwrap();
            assert_eq!(fragment.interface.bindings, vec![SCENE_UNIFORM_BINDING]);
            check_interface(&vertex.interface, &fragment.interface).unwrap();
        }
    }

    #[test]
    fn fallback_shaders_compile_and_link() {
        let vertex = parse_shader(FALLBACK_VERTEX_GLSL, ShaderStage::Vertex).unwrap();
        let fragment = parse_shader(FALLBACK_SCENE_GLSL, ShaderStage::Fragment).unwrap();
        check_interface(&vertex.interface, &fragment.interface).unwrap();
    }

    #[test]
    fn mismatched_varying_fails_to_link() {
        let vertex = parse_shader(
            r"#version 450
layout(location = 0) in vec2 a_position;
layout(location = 0) out vec3 v_uv;
void main() {
    v_uv = vec3(a_position, 0.0);
    gl_Position = vec4(a_position, 0.0, 1.0);
}
",
            ShaderStage::Vertex,
        )
        .unwrap();
        let fragment = parse_shader(BUNDLED_SCENES[0], ShaderStage::Fragment).unwrap();
        let err = check_interface(&vertex.interface, &fragment.interface).unwrap_err();
        assert!(matches!(err, LinkError::VaryingMismatch { location: 0, .. }));
    }

    #[test]
    fn missing_varying_fails_to_link() {
        let vertex = parse_shader(
            r"#version 450
layout(location = 0) in vec2 a_position;
void main() {
    gl_Position = vec4(a_position, 0.0, 1.0);
}
",
            ShaderStage::Vertex,
        )
        .unwrap();
        let fragment = parse_shader(BUNDLED_SCENES[0], ShaderStage::Fragment).unwrap();
        assert_eq!(
            check_interface(&vertex.interface, &fragment.interface),
            Err(LinkError::MissingVarying { location: 0 })
        );
    }

    #[test]
    fn extra_bindings_fail_to_link() {
        let vertex = parse_shader(BUNDLED_VERTEX, ShaderStage::Vertex).unwrap();
        let fragment = ShaderInterface {
            bindings: vec![(0, 0), (1, 0)],
            ..ShaderInterface::default()
        };
        assert_eq!(
            check_interface(&vertex.interface, &fragment),
            Err(LinkError::UnsupportedBinding {
                stage: ShaderStage::Fragment,
                group: 1,
                binding: 0
            })
        );
    }

    #[test]
    fn cache_compiles_each_source_once() {
        let mut cache: ShaderCache<usize> = ShaderCache::new();
        let mut builds = 0;
        for _ in 0..3 {
            let handle = cache
                .compile_with(BUNDLED_VERTEX, ShaderStage::Vertex, |parsed| {
                    builds += 1;
                    Ok(parsed.source.len())
                })
                .unwrap();
            assert_eq!(handle, BUNDLED_VERTEX.len());
        }
        assert_eq!(builds, 1);
        assert_eq!(cache.len(), 1);

        assert!(cache
            .compile_with("", ShaderStage::Fragment, |_| Ok(0))
            .is_err());
        assert!(cache
            .compile_with("", ShaderStage::Fragment, |_| unreachable!())
            .is_err());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn cache_keeps_build_failures() {
        let mut cache: ShaderCache<usize> = ShaderCache::new();
        let rejected = cache.compile_with(FALLBACK_SCENE_GLSL, ShaderStage::Fragment, |parsed| {
            Err(CompileError::new(parsed.stage, "device rejected module"))
        });
        assert_eq!(rejected.unwrap_err().log, "device rejected module");

        let again = cache.compile_with(FALLBACK_SCENE_GLSL, ShaderStage::Fragment, |_| Ok(1));
        assert!(again.is_err());
    }

    #[test]
    fn shaders_needing_missing_capabilities_are_rejected() {
        let scene = "void mainImage(out vec4 c, in vec2 p) { double d = double(p.x); c = vec4(float(d)); }";
        let err = parse_shader(scene, ShaderStage::Fragment).unwrap_err();
        assert_eq!(err.stage, ShaderStage::Fragment);

        let with_f64 = naga::valid::Capabilities::default() | naga::valid::Capabilities::FLOAT64;
        assert!(parse_shader_with(scene, ShaderStage::Fragment, with_f64).is_ok());

        let mut cache: ShaderCache<()> = ShaderCache::with_capabilities(with_f64);
        assert!(cache
            .compile_with(scene, ShaderStage::Fragment, |_| Ok(()))
            .is_ok());
    }

    #[test]
    fn wrap_keeps_uniforms_that_only_share_a_prefix() {
        let source = "uniform float iTimeScale;\nuniform int iFrameCount;\nuniform float iTime;\n  uniform vec3 iResolution ;\nuniform float iFrameHistory[4];\nvoid mainImage(out vec4 c, in vec2 p) { c = vec4(iTimeScale); }\n";
        let wrapped = wrap_scene_fragment(source);
        assert!(wrapped.contains("uniform float iTimeScale;"));
        assert!(wrapped.contains("uniform int iFrameCount;"));
        assert!(wrapped.contains("uniform float iFrameHistory[4];"));
        assert!(!wrapped.contains("uniform float iTime;"));
        assert!(!wrapped.contains("uniform vec3 iResolution"));
    }

    #[test]
    fn declared_uniform_reads_the_declarator() {
        assert_eq!(declared_uniform("uniform float iTime;"), Some("iTime"));
        assert_eq!(declared_uniform("uniform vec3 iResolution ; // size"), Some("iResolution"));
        assert_eq!(declared_uniform("uniform float gains[3];"), Some("gains"));
        assert_eq!(declared_uniform("uniforms float iTime;"), None);
        assert_eq!(declared_uniform("float iTime;"), None);
    }

    #[test]
    fn missing_file_loads_as_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_shader_source(&dir.path().join("absent.glsl")), "");
    }
}
