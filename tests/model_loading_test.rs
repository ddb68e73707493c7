use base64::Engine as _;
use interactive_3d::{
    BackendOptions, LoadRequest, ResourceTable, SceneSession, SessionConfig, SessionError,
    SessionState,
};

use crate::common::test_utils::{BIN_NAME, IMAGE_NAME, ModelBuilder, init_logger, session};

mod common;

fn textured_car() -> ModelBuilder {
    ModelBuilder::new()
        .material([1.0, 1.0, 1.0, 1.0], true)
        .material([0.1, 0.1, 0.1, 1.0], false)
        .mesh_node(Some("Body"), 0)
        .mesh_node(Some("Wheel_L"), 1)
        .mesh_node(Some("Wheel_R"), 1)
}

#[test]
fn should_render_right_after_loading() {
    let mut session = session();
    session
        .load_model(ModelBuilder::car().request("car.gltf"))
        .unwrap();
    session.render();

    assert_eq!(session.state(), SessionState::AssetLoaded);
    let backend = session.backend().unwrap();
    assert_eq!(backend.frames_submitted(), 1);
    // every node plus the asset root
    assert_eq!(backend.live_entity_count(), 5);
    assert_eq!(backend.scene_entities().len(), 5);
}

#[test]
fn should_load_self_contained_binary_models() {
    let mut session = session();
    session
        .load_model(LoadRequest::new(textured_car().glb(), "car.glb"))
        .unwrap();

    let asset = session.asset().unwrap();
    assert_eq!(asset.entity_count(), 3);
    assert_eq!(asset.textures().len(), 1);

    let backend = session.backend().unwrap();
    let texture = backend.texture(asset.textures()[0]).unwrap();
    assert_eq!(texture.label, "car.glb#image0");
    assert_eq!((texture.width, texture.height), (2, 2));
    let body = asset.entity_by_name("Body").unwrap();
    let record = backend.entity(body).unwrap();
    assert_eq!(record.primitives.len(), 1);
    assert_eq!(record.primitives[0].texture, Some(asset.textures()[0]));
    assert_eq!(record.primitives[0].index_count, 3);
}

#[test]
fn should_resolve_external_references_through_the_resource_table() {
    let mut session = session();
    let (bytes, resources) = textured_car().gltf();
    assert_eq!(resources.len(), 2);
    session
        .load_model(LoadRequest::new(bytes, "car.gltf").with_resources(resources))
        .unwrap();

    let asset = session.asset().unwrap();
    let backend = session.backend().unwrap();
    assert_eq!(backend.texture_count(), 1);
    let texture = backend.texture(asset.textures()[0]).unwrap();
    assert_eq!((texture.width, texture.height), (4, 4));
}

#[test]
fn should_decode_embedded_data_uris() {
    let mut session = session();
    let (bytes, resources) = ModelBuilder::car().gltf();
    let encoded = base64::engine::general_purpose::STANDARD.encode(resources.get(BIN_NAME).unwrap());
    let json = String::from_utf8(bytes).unwrap().replace(
        &format!("\"{BIN_NAME}\""),
        &format!("\"data:application/octet-stream;base64,{encoded}\""),
    );

    session
        .load_model(LoadRequest::new(json, "inline.gltf"))
        .unwrap();
    assert_eq!(session.asset().unwrap().entity_count(), 4);
}

#[test]
fn should_detect_the_container_regardless_of_the_name() {
    let mut session = session();
    session
        .load_model(LoadRequest::new(ModelBuilder::car().glb(), "misnamed.gltf"))
        .unwrap();
    assert_eq!(session.asset().unwrap().entity_count(), 4);
}

#[test]
fn should_replace_the_previous_asset_completely() {
    let mut session = session();
    session
        .load_model(ModelBuilder::car().request("a.gltf"))
        .unwrap();
    let first: Vec<_> = session.asset().unwrap().entities().collect();

    let single = ModelBuilder::new()
        .material([1.0, 0.0, 0.0, 1.0], false)
        .mesh_node(Some("Crate"), 0);
    session.load_model(single.request("b.gltf")).unwrap();

    let asset = session.asset().unwrap();
    assert_eq!(asset.name(), "b.gltf");
    assert_eq!(asset.entity_count(), single.node_count());
    assert!(asset.entity_by_name("Body").is_none());

    let backend = session.backend().unwrap();
    assert_eq!(backend.live_entity_count(), single.node_count() + 1);
    assert_eq!(backend.scene_entities().len(), single.node_count() + 1);
    for entity in first {
        assert!(backend.entity(entity).is_none());
    }
}

#[test]
fn should_keep_the_previous_asset_when_a_resource_is_missing() {
    let mut session = session();
    session
        .load_model(ModelBuilder::car().request("car.gltf"))
        .unwrap();
    let body = session.asset().unwrap().entity_by_name("Body");

    let (bytes, resources) = textured_car().gltf();
    let partial = ResourceTable::new().with(BIN_NAME, resources.get(BIN_NAME).unwrap());
    let err = session
        .load_model(LoadRequest::new(bytes, "textured.gltf").with_resources(partial))
        .unwrap_err();

    match err {
        SessionError::ResourceNotFound { name } => assert_eq!(name, IMAGE_NAME),
        other => panic!("unexpected error {other:?}"),
    }
    let asset = session.asset().unwrap();
    assert_eq!(asset.name(), "car.gltf");
    assert_eq!(asset.entity_by_name("Body"), body);
    let backend = session.backend().unwrap();
    assert_eq!(backend.live_entity_count(), 5);
    assert_eq!(backend.texture_count(), 0);
}

#[test]
fn should_report_a_missing_buffer() {
    let mut session = session();
    let (bytes, _) = ModelBuilder::car().gltf();
    let err = session
        .load_model(LoadRequest::new(bytes, "car.gltf"))
        .unwrap_err();
    assert!(matches!(err, SessionError::ResourceNotFound { name } if name == BIN_NAME));
    assert_eq!(session.state(), SessionState::BackendReady);
}

#[test]
fn should_reject_malformed_models() {
    let mut session = session();
    session
        .load_model(ModelBuilder::car().request("car.gltf"))
        .unwrap();

    for bytes in [
        b"definitely not a model".to_vec(),
        b"{\"asset\": ".to_vec(),
        b"glTF\x02\0\0\0\x0c\0\0\0".to_vec(),
        Vec::new(),
    ] {
        let err = session
            .load_model(LoadRequest::new(bytes, "broken.glb"))
            .unwrap_err();
        assert!(matches!(err, SessionError::Parse { .. }), "{err:?}");
    }
    assert_eq!(session.asset().unwrap().name(), "car.gltf");
    assert_eq!(session.backend().unwrap().live_entity_count(), 5);
}

#[test]
fn should_report_undecodable_textures_as_parse_errors() {
    let mut session = session();
    let (bytes, mut resources) = textured_car().gltf();
    resources.insert(IMAGE_NAME, b"\x89PNG but not really".to_vec());
    let err = session
        .load_model(LoadRequest::new(bytes, "car.gltf").with_resources(resources))
        .unwrap_err();
    assert!(matches!(err, SessionError::Parse { .. }), "{err:?}");
    assert_eq!(session.backend().unwrap().live_entity_count(), 0);
}

#[test]
fn should_roll_back_when_the_backend_runs_out_of_textures() {
    init_logger();
    let mut session: SceneSession = SceneSession::new(SessionConfig {
        backend_options: BackendOptions::new().with("texture_budget", 0),
        ..Default::default()
    })
    .unwrap();
    session
        .load_model(ModelBuilder::car().request("car.gltf"))
        .unwrap();

    let err = session
        .load_model(LoadRequest::new(textured_car().glb(), "textured.glb"))
        .unwrap_err();
    assert!(matches!(err, SessionError::BackendResource(_)), "{err:?}");

    // nothing of the failed attempt survives, the car is untouched
    let backend = session.backend().unwrap();
    assert_eq!(backend.live_entity_count(), 5);
    assert_eq!(backend.scene_entities().len(), 5);
    assert_eq!(backend.texture_count(), 0);
    assert_eq!(session.asset().unwrap().name(), "car.gltf");

    session.render();
    assert_eq!(session.backend().unwrap().frames_submitted(), 1);
}

#[test]
fn should_let_the_last_duplicate_name_win() {
    let mut session = session();
    let model = ModelBuilder::new()
        .material([1.0, 0.0, 0.0, 1.0], false)
        .material([0.0, 0.0, 1.0, 1.0], false)
        .mesh_node(Some("Body"), 0)
        .mesh_node(Some("Body"), 1);
    session.load_model(model.request("dupes.gltf")).unwrap();

    let asset = session.asset().unwrap();
    assert_eq!(asset.entity_count(), 2);
    assert_eq!(asset.names().len(), 1);
    let body = asset.entity_by_name("Body").unwrap();
    assert_eq!(
        session.backend().unwrap().base_color(body, 0).unwrap().0,
        [0.0, 0.0, 1.0, 1.0]
    );
}

#[test]
fn should_fit_models_into_the_view_when_auto_scaling() {
    init_logger();
    let mut session: SceneSession = SceneSession::new(SessionConfig::default()).unwrap();
    session
        .load_model(ModelBuilder::car().request("car.gltf"))
        .unwrap();

    let asset = session.asset().unwrap();
    let bounds = asset.bounds().unwrap();
    let placed = bounds.transformed(&asset.root_transform());
    let center = placed.center();
    let extent = placed.extent();
    let target = session.config().object_position;
    assert!((center.x - target[0]).abs() < 1e-5);
    assert!((center.y - target[1]).abs() < 1e-5);
    assert!((center.z - target[2]).abs() < 1e-5);
    assert!((extent.x.max(extent.y).max(extent.z) - 2.0).abs() < 1e-5);
}
