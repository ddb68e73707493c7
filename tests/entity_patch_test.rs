use interactive_3d::{LoadRequest, Rgba};

use crate::common::test_utils::{ModelBuilder, SelectionLog, session};

mod common;

const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const BODY: [f32; 4] = [0.2, 0.2, 0.8, 1.0];
const TYRE: [f32; 4] = [0.1, 0.1, 0.1, 1.0];

fn color_of(session: &interactive_3d::SceneSession, name: &str) -> [f32; 4] {
    let entity = session.asset().unwrap().entity_by_name(name).unwrap();
    session.backend().unwrap().base_color(entity, 0).unwrap().0
}

#[test]
fn should_report_selected_wheels_in_input_order() {
    let mut session = session();
    let selections = SelectionLog::default();
    selections.attach(&mut session);

    session
        .load_model(
            ModelBuilder::car()
                .request("car.gltf")
                .preselect(["Wheel_L", "Wheel_R"])
                .with_selection_color(RED),
        )
        .unwrap();

    let calls = selections.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(selections.names(0), ["Wheel_L", "Wheel_R"]);
    let asset = session.asset().unwrap();
    assert_eq!(calls[0][0].id, asset.entity_by_name("Wheel_L").unwrap().id());
    assert_eq!(calls[0][1].id, asset.entity_by_name("Wheel_R").unwrap().id());

    assert_eq!(color_of(&session, "Wheel_L"), RED);
    assert_eq!(color_of(&session, "Wheel_R"), RED);
    assert_eq!(color_of(&session, "Body"), BODY);
}

#[test]
fn should_follow_the_callers_order_not_the_models() {
    let mut session = session();
    let selections = SelectionLog::default();
    selections.attach(&mut session);
    session
        .load_model(
            ModelBuilder::car()
                .request("car.gltf")
                .preselect(["Wheel_R", "Body", "Wheel_L", "Wheel_R"]),
        )
        .unwrap();

    assert_eq!(selections.names(0), ["Wheel_R", "Body", "Wheel_L"]);
    // no color given: selection leaves materials alone
    assert_eq!(color_of(&session, "Wheel_R"), TYRE);
}

#[test]
fn should_skip_names_the_model_lacks() {
    let mut session = session();
    let selections = SelectionLog::default();
    selections.attach(&mut session);
    let one_wheel = ModelBuilder::new()
        .material(BODY, false)
        .material(TYRE, false)
        .mesh_node(Some("Body"), 0)
        .mesh_node(Some("Wheel_L"), 1);

    session
        .load_model(
            one_wheel
                .request("trike.gltf")
                .preselect(["Wheel_L", "Wheel_R"])
                .with_selection_color(RED),
        )
        .unwrap();

    assert_eq!(selections.calls().len(), 1);
    assert_eq!(selections.names(0), ["Wheel_L"]);
    assert_eq!(color_of(&session, "Wheel_L"), RED);
}

#[test]
fn should_emit_an_empty_list_once_when_nothing_is_selectable() {
    let mut session = session();
    let selections = SelectionLog::default();
    selections.attach(&mut session);

    session
        .load_model(ModelBuilder::car().request("car.gltf"))
        .unwrap();
    session
        .load_model(ModelBuilder::car().request("car.gltf").preselect(["Spoiler"]))
        .unwrap();

    let calls = selections.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(Vec::is_empty));
}

#[test]
fn should_not_emit_for_failed_loads() {
    let mut session = session();
    let selections = SelectionLog::default();
    selections.attach(&mut session);

    let _ = session
        .load_model(LoadRequest::new(b"nope".to_vec(), "x.glb").preselect(["Body"]))
        .unwrap_err();
    assert!(selections.calls().is_empty());
}

#[test]
fn should_let_the_last_patch_on_a_name_win() {
    let mut session = session();
    let c1: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
    let c2: [f32; 4] = [1.0, 1.0, 0.0, 0.5];
    session
        .load_model(
            ModelBuilder::car()
                .request("car.gltf")
                .patch("Body", c1)
                .patch("Body", c2)
                .patch("Bumper", RED),
        )
        .unwrap();

    assert_eq!(color_of(&session, "Body"), c2);
    assert_eq!(color_of(&session, "Wheel_L"), TYRE);
}

#[test]
fn should_forward_overrides_from_groups_to_their_meshes() {
    let mut session = session();
    let selections = SelectionLog::default();
    selections.attach(&mut session);
    let green = Rgba::GREEN;

    session
        .load_model(
            ModelBuilder::car()
                .request("car.gltf")
                .patch("Wheels", green)
                .preselect(["Wheels"]),
        )
        .unwrap();

    assert_eq!(color_of(&session, "Wheel_L"), green.0);
    assert_eq!(color_of(&session, "Wheel_R"), green.0);
    assert_eq!(color_of(&session, "Body"), BODY);
    let wheels = session.asset().unwrap().entity_by_name("Wheels").unwrap();
    assert_eq!(selections.calls()[0][0].id, wheels.id());
}

#[test]
fn should_highlight_over_patched_colors() {
    let mut session = session();
    session
        .load_model(
            ModelBuilder::car()
                .request("car.gltf")
                .patch("Wheel_L", Rgba::GREEN)
                .preselect(["Wheel_L"])
                .with_selection_color(RED),
        )
        .unwrap();
    assert_eq!(color_of(&session, "Wheel_L"), RED);
}

#[test]
fn should_restore_declared_colors_on_unselect() {
    let mut session = session();
    let selections = SelectionLog::default();
    selections.attach(&mut session);
    session
        .load_model(
            ModelBuilder::car()
                .request("car.gltf")
                .preselect(["Wheel_L", "Wheel_R", "Body"])
                .with_selection_color(RED),
        )
        .unwrap();
    let wheel_l = session.asset().unwrap().entity_by_name("Wheel_L").unwrap();
    let root = session.asset().unwrap().root();

    let restored = session
        .unselect_entities(Some(&[wheel_l.id(), root.id(), 9_999][..]))
        .unwrap();
    assert_eq!(restored, 1);
    assert_eq!(color_of(&session, "Wheel_L"), TYRE);
    assert_eq!(color_of(&session, "Wheel_R"), RED);
    assert_eq!(selections.calls().len(), 1);

    session.unselect_entities(None).unwrap();
    assert_eq!(color_of(&session, "Wheel_R"), TYRE);
    assert_eq!(color_of(&session, "Body"), BODY);
    let calls = selections.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].is_empty());
}

#[test]
fn should_produce_identical_results_for_identical_inputs() {
    let run = || {
        let mut session = session();
        let selections = SelectionLog::default();
        selections.attach(&mut session);
        session
            .load_model(
                ModelBuilder::car()
                    .request("car.gltf")
                    .patch("Body", RED)
                    .patch("Wheel_R", Rgba::GREEN)
                    .preselect(["Wheel_R", "Wheel_L", "Body"])
                    .with_selection_color(Rgba::new(0.0, 0.0, 1.0, 1.0)),
            )
            .unwrap();
        let colors: Vec<[f32; 4]> = ["Body", "Wheel_L", "Wheel_R"]
            .iter()
            .map(|name| color_of(&session, name))
            .collect();
        (selections.calls(), colors)
    };
    assert_eq!(run(), run());
}

#[test]
fn should_keep_patches_when_clearing_the_selection() {
    let mut session = session();
    let blue = Rgba::new(0.0, 0.0, 1.0, 1.0);
    session
        .load_model(
            ModelBuilder::car()
                .request("car.gltf")
                .patch("Body", RED)
                .patch("Wheel_L", Rgba::GREEN)
                .preselect(["Wheel_L"])
                .with_selection_color(blue),
        )
        .unwrap();
    assert_eq!(color_of(&session, "Wheel_L"), blue.0);

    session.unselect_entities(None).unwrap();

    assert_eq!(color_of(&session, "Body"), RED);
    assert_eq!(color_of(&session, "Wheel_L"), Rgba::GREEN.0);
    assert_eq!(color_of(&session, "Wheel_R"), TYRE);
}

#[test]
fn should_leave_entities_that_were_never_highlighted_alone() {
    let mut session = session();
    session
        .load_model(
            ModelBuilder::car()
                .request("car.gltf")
                .patch("Body", RED)
                .preselect(["Wheel_R"])
                .with_selection_color(Rgba::GREEN),
        )
        .unwrap();
    let body = session.asset().unwrap().entity_by_name("Body").unwrap();

    let restored = session.unselect_entities(Some(&[body.id()][..])).unwrap();

    assert_eq!(restored, 0);
    assert_eq!(color_of(&session, "Body"), RED);
    assert_eq!(color_of(&session, "Wheel_R"), Rgba::GREEN.0);
}

#[test]
fn should_keep_a_wheel_tinted_while_its_group_is_selected() {
    let mut session = session();
    session
        .load_model(
            ModelBuilder::car()
                .request("car.gltf")
                .preselect(["Wheels", "Wheel_L"])
                .with_selection_color(RED),
        )
        .unwrap();
    let wheel_l = session.asset().unwrap().entity_by_name("Wheel_L").unwrap();

    let restored = session.unselect_entities(Some(&[wheel_l.id()][..])).unwrap();
    assert_eq!(restored, 1);
    assert_eq!(color_of(&session, "Wheel_L"), RED);

    session.unselect_entities(None).unwrap();
    assert_eq!(color_of(&session, "Wheel_L"), TYRE);
    assert_eq!(color_of(&session, "Wheel_R"), TYRE);
}

#[test]
fn should_start_a_new_model_without_old_highlights() {
    let mut session = session();
    session
        .load_model(
            ModelBuilder::car()
                .request("car.gltf")
                .patch("Body", RED)
                .preselect(["Wheel_L"])
                .with_selection_color(RED),
        )
        .unwrap();
    session
        .load_model(ModelBuilder::car().request("car.gltf"))
        .unwrap();

    assert_eq!(session.unselect_entities(None).unwrap(), 0);
    assert_eq!(color_of(&session, "Body"), BODY);
    assert_eq!(color_of(&session, "Wheel_L"), TYRE);
}
