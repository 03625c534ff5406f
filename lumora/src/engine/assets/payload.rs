use crate::assets::{
    AssetError, AssetId, AssetKind, EmptyMeshErr, ImageErr, InvalidShaderErr, MaterialErr,
    MeshErr, MeshIndexErr, Utf8Err,
};
use crate::gpu::VertexLayout;
use crate::utils::validate_wgsl_source;
use bon::Builder;
use bytemuck::{Pod, Zeroable};
use serde::Deserialize;
use snafu::{OptionExt, ResultExt};
use std::collections::HashMap;
use std::sync::Arc;

/// Decoded, CPU-side content of a ready asset.
#[derive(Debug, Clone)]
pub enum AssetPayload {
    Shader(ShaderSource),
    Texture(TextureData),
    Mesh(MeshData),
    Material(MaterialDesc),
}

impl AssetPayload {
    pub fn kind(&self) -> AssetKind {
        match self {
            AssetPayload::Shader(_) => AssetKind::Shader,
            AssetPayload::Texture(_) => AssetKind::Texture,
            AssetPayload::Mesh(_) => AssetKind::Mesh,
            AssetPayload::Material(_) => AssetKind::Material,
        }
    }

    pub fn as_shader(&self) -> Option<&ShaderSource> {
        match self {
            AssetPayload::Shader(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_texture(&self) -> Option<&TextureData> {
        match self {
            AssetPayload::Texture(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_mesh(&self) -> Option<&MeshData> {
        match self {
            AssetPayload::Mesh(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_material(&self) -> Option<&MaterialDesc> {
        match self {
            AssetPayload::Material(m) => Some(m),
            _ => None,
        }
    }
}

/// WGSL source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    code: Arc<str>,
}

impl ShaderSource {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self {
            code: Arc::from(code.as_ref()),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

/// Tightly packed RGBA8 texels, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TextureData {
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let rgba = color.repeat((width * height) as usize);
        Self {
            width,
            height,
            rgba,
        }
    }

    /// Black and magenta checkers, one texel each. Hard to mistake for real content.
    pub fn checkerboard(width: u32, height: u32) -> Self {
        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                if x % 2 == y % 2 {
                    rgba.extend_from_slice(&[0, 0, 0, 255]);
                } else {
                    rgba.extend_from_slice(&[255, 0, 255, 255]);
                }
            }
        }
        Self {
            width,
            height,
            rgba,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex3D {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex3D {
    pub const fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }

    pub fn layout() -> VertexLayout {
        VertexLayout {
            array_stride: size_of::<Vertex3D>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: wgpu::vertex_attr_array![
                0 => Float32x3,
                1 => Float32x3,
                2 => Float32x2,
            ]
            .to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex3D>,
    /// Without indices the vertices are drawn as a plain triangle list.
    pub indices: Option<Vec<u32>>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex3D>, indices: Option<Vec<u32>>) -> Self {
        Self { vertices, indices }
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn index_count(&self) -> Option<u32> {
        self.indices.as_ref().map(|i| i.len() as u32)
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> Option<&[u8]> {
        self.indices.as_deref().map(bytemuck::cast_slice)
    }
}

fn default_base_color() -> [f32; 4] {
    [1.0, 1.0, 1.0, 1.0]
}

/// Surface parameters, stored as JSON: `{ "name": "...", "base_color": [r, g, b, a] }`.
#[derive(Debug, Clone, PartialEq, Deserialize, Builder)]
pub struct MaterialDesc {
    #[builder(into)]
    pub name: String,
    #[serde(default = "default_base_color")]
    #[builder(default = default_base_color())]
    pub base_color: [f32; 4],
}

impl Default for MaterialDesc {
    fn default() -> Self {
        MaterialDesc::builder().name("Default Material").build()
    }
}

pub(crate) fn decode_payload(
    id: &AssetId,
    kind: AssetKind,
    bytes: Vec<u8>,
) -> Result<AssetPayload, AssetError> {
    match kind {
        AssetKind::Shader => decode_shader(id, bytes).map(AssetPayload::Shader),
        AssetKind::Texture => decode_texture(id, &bytes).map(AssetPayload::Texture),
        AssetKind::Mesh => decode_mesh(id, &bytes).map(AssetPayload::Mesh),
        AssetKind::Material => serde_json::from_slice(&bytes)
            .context(MaterialErr { id: id.clone() })
            .map(AssetPayload::Material),
    }
}

fn decode_shader(id: &AssetId, bytes: Vec<u8>) -> Result<ShaderSource, AssetError> {
    let code = String::from_utf8(bytes).context(Utf8Err { id: id.clone() })?;
    if let Err(e) = validate_wgsl_source(&code) {
        return InvalidShaderErr {
            id: id.clone(),
            message: e.emit_to_string(&code),
        }
        .fail();
    }
    Ok(ShaderSource::new(code))
}

fn decode_texture(id: &AssetId, bytes: &[u8]) -> Result<TextureData, AssetError> {
    let image = image::load_from_memory(bytes)
        .context(ImageErr { id: id.clone() })?
        .into_rgba8();
    Ok(TextureData {
        width: image.width(),
        height: image.height(),
        rgba: image.into_raw(),
    })
}

fn decode_mesh(id: &AssetId, bytes: &[u8]) -> Result<MeshData, AssetError> {
    let data = obj::ObjData::load_buf(bytes).context(MeshErr { id: id.clone() })?;

    // one vertex per distinct position/uv/normal triple, polygons fanned into triangles
    let mut slots: HashMap<obj::IndexTuple, u32> = HashMap::new();
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    let polygons = data
        .objects
        .iter()
        .flat_map(|object| &object.groups)
        .flat_map(|group| &group.polys);

    for obj::SimplePolygon(corners) in polygons {
        let mut polygon = Vec::with_capacity(corners.len());
        for &corner in corners {
            let index = match slots.get(&corner) {
                Some(&index) => index,
                None => {
                    let vertex = mesh_vertex(id, &data, corner)?;
                    let index = vertices.len() as u32;
                    vertices.push(vertex);
                    slots.insert(corner, index);
                    index
                }
            };
            polygon.push(index);
        }

        for i in 1..polygon.len().saturating_sub(1) {
            indices.extend_from_slice(&[polygon[0], polygon[i], polygon[i + 1]]);
        }
    }

    if indices.is_empty() {
        return EmptyMeshErr { id: id.clone() }.fail();
    }

    Ok(MeshData::new(vertices, Some(indices)))
}

fn mesh_vertex(
    id: &AssetId,
    data: &obj::ObjData,
    obj::IndexTuple(p, t, n): obj::IndexTuple,
) -> Result<Vertex3D, AssetError> {
    let out_of_range = |index: usize| MeshIndexErr {
        id: id.clone(),
        index,
    };

    let position = *data.position.get(p).context(out_of_range(p))?;
    let uv = match t {
        Some(t) => *data.texture.get(t).context(out_of_range(t))?,
        None => [0.0; 2],
    };
    let normal = match n {
        Some(n) => *data.normal.get(n).context(out_of_range(n))?,
        None => [0.0; 3],
    };

    Ok(Vertex3D::new(position, normal, uv))
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD_OBJ: &str = "\
v -1 -1 0
v 1 -1 0
v 1 1 0
v -1 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1
f 1/1/1 3/3/1 4/4/1
";

    #[test]
    fn decodes_obj_meshes() {
        let id = AssetId::new("quad.obj");
        let payload = decode_payload(&id, AssetKind::Mesh, QUAD_OBJ.as_bytes().to_vec()).unwrap();
        let mesh = payload.as_mesh().unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.index_count(), Some(6));
        assert!(mesh.vertices.iter().all(|v| v.normal == [0.0, 0.0, 1.0]));
    }

    #[test]
    fn polygons_are_fanned_into_triangles() {
        let id = AssetId::new("pentagon.obj");
        let obj = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nv -1 0.5 0\nf 1 2 3 4 5\n";
        let payload = decode_payload(&id, AssetKind::Mesh, obj.as_bytes().to_vec()).unwrap();
        let mesh = payload.as_mesh().unwrap();
        assert_eq!(mesh.vertex_count(), 5);
        assert_eq!(
            mesh.indices.as_deref(),
            Some(&[0, 1, 2, 0, 2, 3, 0, 3, 4][..])
        );
        assert!(mesh.vertices.iter().all(|v| v.uv == [0.0; 2]));
    }

    #[test]
    fn meshes_without_faces_or_with_dangling_indices_fail() {
        let id = AssetId::new("points.obj");
        let err = decode_payload(&id, AssetKind::Mesh, b"v 0 0 0\n".to_vec()).unwrap_err();
        assert!(matches!(err, AssetError::EmptyMesh { .. }));

        let id = AssetId::new("dangling.obj");
        let obj = b"v 0 0 0\nv 1 0 0\nf 1 2 7\n".to_vec();
        let err = decode_payload(&id, AssetKind::Mesh, obj).unwrap_err();
        assert!(matches!(err, AssetError::MeshIndex { index: 6, .. }));
    }

    #[test]
    fn materials_default_to_white() {
        let id = AssetId::new("plain.json");
        let payload =
            decode_payload(&id, AssetKind::Material, br#"{ "name": "plain" }"#.to_vec()).unwrap();
        let material = payload.as_material().unwrap();
        assert_eq!(material.name, "plain");
        assert_eq!(material.base_color, [1.0; 4]);
    }

    #[test]
    fn invalid_shaders_are_rejected() {
        let id = AssetId::new("broken.wgsl");
        let err = decode_payload(&id, AssetKind::Shader, b"fn (".to_vec()).unwrap_err();
        assert!(matches!(err, AssetError::InvalidShader { .. }));
    }

    #[test]
    fn decodes_png_textures() {
        let mut png = Vec::new();
        image::RgbaImage::from_pixel(2, 3, image::Rgba([10, 20, 30, 255]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let id = AssetId::new("tiny.png");
        let payload = decode_payload(&id, AssetKind::Texture, png).unwrap();
        let texture = payload.as_texture().unwrap();
        assert_eq!((texture.width, texture.height), (2, 3));
        assert_eq!(&texture.rgba[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn checkerboard_alternates() {
        let checker = TextureData::checkerboard(2, 2);
        assert_eq!(checker.rgba.len(), 16);
        assert_eq!(&checker.rgba[0..4], &[0, 0, 0, 255]);
        assert_eq!(&checker.rgba[4..8], &[255, 0, 255, 255]);
        assert_eq!(&checker.rgba[8..12], &[255, 0, 255, 255]);
    }
}
