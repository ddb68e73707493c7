use std::{
    io::Cursor,
    sync::{Arc, Mutex},
};

use interactive_3d::{LoadRequest, ResourceTable, SceneSession, SelectionEntry, SessionConfig};
use serde_json::{Map, Value, json};

pub const BIN_NAME: &str = "model.bin";
pub const IMAGE_NAME: &str = "base_color.png";

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Session on the recording backend with auto scaling switched off, so
/// transforms in assertions are the ones declared by the fixture.
pub fn session() -> SceneSession {
    init_logger();
    SceneSession::new(SessionConfig {
        auto_scale: false,
        ..Default::default()
    })
    .expect("session")
}

/// Collects every selection list the session emits.
#[derive(Clone, Default)]
pub struct SelectionLog(Arc<Mutex<Vec<Vec<SelectionEntry>>>>);

impl SelectionLog {
    pub fn attach(&self, session: &mut SceneSession) {
        let log = Arc::clone(&self.0);
        session.set_selection_callback(move |entries: &[SelectionEntry]| {
            log.lock().expect("selection log").push(entries.to_vec());
        });
    }

    pub fn calls(&self) -> Vec<Vec<SelectionEntry>> {
        self.0.lock().expect("selection log").clone()
    }

    pub fn names(&self, call: usize) -> Vec<String> {
        self.calls()[call].iter().map(|e| e.name.clone()).collect()
    }
}

struct MaterialSpec {
    color: [f32; 4],
    textured: bool,
}

struct NodeSpec {
    name: Option<String>,
    material: Option<usize>,
    children: Vec<usize>,
}

/// Builds small glTF documents: one triangle per mesh node, one mesh per
/// material, an optional PNG base color map shared by textured materials.
#[derive(Default)]
pub struct ModelBuilder {
    materials: Vec<MaterialSpec>,
    nodes: Vec<NodeSpec>,
}

// positions (36 bytes), uvs (24), u16 indices (6) padded to 68
const POSITIONS: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
const UVS: [[f32; 2]; 3] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
const GEOMETRY_LEN: usize = 68;

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a material; its index is the number of materials added before.
    pub fn material(mut self, color: [f32; 4], textured: bool) -> Self {
        self.materials.push(MaterialSpec { color, textured });
        self
    }

    /// Adds a triangle node drawn with `material`.
    pub fn mesh_node(mut self, name: Option<&str>, material: usize) -> Self {
        self.nodes.push(NodeSpec {
            name: name.map(str::to_string),
            material: Some(material),
            children: Vec::new(),
        });
        self
    }

    /// Adds a node without geometry parenting `children`.
    pub fn group(mut self, name: &str, children: &[usize]) -> Self {
        self.nodes.push(NodeSpec {
            name: Some(name.to_string()),
            material: None,
            children: children.to_vec(),
        });
        self
    }

    /// A car: Body, Wheel_L, Wheel_R under a "Wheels" group.
    pub fn car() -> Self {
        Self::new()
            .material([0.2, 0.2, 0.8, 1.0], false)
            .material([0.1, 0.1, 0.1, 1.0], false)
            .mesh_node(Some("Body"), 0)
            .mesh_node(Some("Wheel_L"), 1)
            .mesh_node(Some("Wheel_R"), 1)
            .group("Wheels", &[1, 2])
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn textured(&self) -> bool {
        self.materials.iter().any(|m| m.textured)
    }

    fn geometry() -> Vec<u8> {
        let mut bytes = Vec::with_capacity(GEOMETRY_LEN);
        for p in POSITIONS.iter().flatten().chain(UVS.iter().flatten()) {
            bytes.extend_from_slice(&p.to_le_bytes());
        }
        for i in [0u16, 1, 2] {
            bytes.extend_from_slice(&i.to_le_bytes());
        }
        bytes.resize(GEOMETRY_LEN, 0);
        bytes
    }

    fn document(&self, buffer: Value, image: Value, image_view: Option<Value>) -> Value {
        let mut buffer_views = vec![
            json!({"buffer": 0, "byteOffset": 0, "byteLength": 36, "target": 34962}),
            json!({"buffer": 0, "byteOffset": 36, "byteLength": 24, "target": 34962}),
            json!({"buffer": 0, "byteOffset": 60, "byteLength": 6, "target": 34963}),
        ];
        buffer_views.extend(image_view);

        let children: Vec<usize> = self.nodes.iter().flat_map(|n| n.children.clone()).collect();
        let roots: Vec<usize> = (0..self.nodes.len())
            .filter(|i| !children.contains(i))
            .collect();
        let nodes: Vec<Value> = self
            .nodes
            .iter()
            .map(|node| {
                let mut object = Map::new();
                if let Some(name) = &node.name {
                    object.insert("name".into(), json!(name));
                }
                if let Some(material) = node.material {
                    object.insert("mesh".into(), json!(material));
                }
                if !node.children.is_empty() {
                    object.insert("children".into(), json!(node.children));
                }
                Value::Object(object)
            })
            .collect();
        let meshes: Vec<Value> = (0..self.materials.len())
            .map(|material| {
                json!({"primitives": [{
                    "attributes": {"POSITION": 0, "TEXCOORD_0": 1},
                    "indices": 2,
                    "material": material,
                }]})
            })
            .collect();
        let materials: Vec<Value> = self
            .materials
            .iter()
            .map(|m| {
                let mut pbr = json!({"baseColorFactor": m.color});
                if m.textured {
                    pbr["baseColorTexture"] = json!({"index": 0});
                }
                json!({"pbrMetallicRoughness": pbr})
            })
            .collect();

        let mut document = json!({
            "asset": {"version": "2.0"},
            "scene": 0,
            "scenes": [{"nodes": roots}],
            "nodes": nodes,
            "meshes": meshes,
            "materials": materials,
            "buffers": [buffer],
            "bufferViews": buffer_views,
            "accessors": [
                {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                 "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]},
                {"bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC2"},
                {"bufferView": 2, "componentType": 5123, "count": 3, "type": "SCALAR"},
            ],
        });
        if self.textured() {
            document["textures"] = json!([{"source": 0}]);
            document["images"] = json!([image]);
        }
        document
    }

    /// JSON container referencing `model.bin` and `base_color.png`, plus a
    /// resource table holding both.
    pub fn gltf(&self) -> (Vec<u8>, ResourceTable) {
        let document = self.document(
            json!({"byteLength": GEOMETRY_LEN, "uri": BIN_NAME}),
            json!({"uri": IMAGE_NAME}),
            None,
        );
        let mut resources = ResourceTable::new().with(BIN_NAME, Self::geometry());
        if self.textured() {
            resources.insert(IMAGE_NAME, png(4, 4, [255, 255, 255, 255]));
        }
        (document.to_string().into_bytes(), resources)
    }

    /// Self-contained binary container with the image in a buffer view.
    pub fn glb(&self) -> Vec<u8> {
        let mut bin = Self::geometry();
        let image_view = self.textured().then(|| {
            let image = png(2, 2, [255, 255, 255, 255]);
            let view = json!({"buffer": 0, "byteOffset": bin.len(), "byteLength": image.len()});
            bin.extend_from_slice(&image);
            view
        });
        while bin.len() % 4 != 0 {
            bin.push(0);
        }
        let document = self.document(
            json!({"byteLength": bin.len()}),
            json!({"bufferView": 3, "mimeType": "image/png"}),
            image_view,
        );
        let mut json_chunk = document.to_string().into_bytes();
        while json_chunk.len() % 4 != 0 {
            json_chunk.push(b' ');
        }

        let total = 12 + 8 + json_chunk.len() + 8 + bin.len();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"glTF");
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
        out.extend_from_slice(b"JSON");
        out.extend_from_slice(&json_chunk);
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(b"BIN\0");
        out.extend_from_slice(&bin);
        out
    }

    pub fn request(&self, name: &str) -> LoadRequest {
        let (bytes, resources) = self.gltf();
        LoadRequest::new(bytes, name).with_resources(resources)
    }
}

pub fn png(width: u32, height: u32, pixel: [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba(pixel));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("png encode");
    bytes
}

/// Little-endian RGBA8 KTX1 cubemap, every texel `pixel`. `sh` lands in the
/// "sh" metadata entry when given.
pub fn ktx_cube(size: u32, levels: u32, pixel: [u8; 4], sh: Option<&str>) -> Vec<u8> {
    const IDENTIFIER: [u8; 12] = [
        0xAB, 0x4B, 0x54, 0x58, 0x20, 0x31, 0x31, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A,
    ];
    let mut kv = Vec::new();
    if let Some(sh) = sh {
        let mut pair = b"sh\0".to_vec();
        pair.extend_from_slice(sh.as_bytes());
        pair.push(0);
        kv.extend_from_slice(&(pair.len() as u32).to_le_bytes());
        kv.extend_from_slice(&pair);
        while kv.len() % 4 != 0 {
            kv.push(0);
        }
    }
    let mut out = IDENTIFIER.to_vec();
    // endianness, type, type size, format, internal, base internal, w, h,
    // depth, array elements, faces, levels, kv bytes
    for word in [
        0x0403_0201,
        0x1401,
        1,
        0x1908,
        0x8058,
        0x1908,
        size,
        size,
        0,
        0,
        6,
        levels,
        kv.len() as u32,
    ] {
        out.extend_from_slice(&u32::to_le_bytes(word));
    }
    out.extend_from_slice(&kv);
    for level in 0..levels {
        let s = (size >> level).max(1) as usize;
        out.extend_from_slice(&((s * s * 4) as u32).to_le_bytes());
        for _ in 0..6 {
            for _ in 0..s * s {
                out.extend_from_slice(&pixel);
            }
        }
    }
    out
}

/// 27 whitespace separated coefficients, band 0 set to `dc`.
pub fn sh_string(dc: [f32; 3]) -> String {
    let mut values = vec![0.0f32; 27];
    values[..3].copy_from_slice(&dc);
    values
        .iter()
        .map(f32::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
