use approx::assert_relative_eq;
use dhview::canvas::{Canvas, DrawQueue};
use dhview::{
    Config, ConfigError, DMat4, DVec3, DhField, DhParams, DhValue, JointModel, JointType,
    JointValues, ModelError, OrbitCamera, ParameterError, RobotView, SceneGraph, SceneStyle,
    StructureError, TransformEngine, forward_kinematics,
};

fn planar_2r() -> JointModel {
    JointModel::build(
        vec![
            DhParams::new().theta("q1").r(1.0),
            DhParams::new().theta("q2").r(1.0),
        ],
        vec![JointType::Revolute; 2],
        vec![0, 1],
    )
    .unwrap()
}

#[test]
fn zero_dh_chain_is_identity() {
    let model = JointModel::build(
        vec![DhParams::new(), DhParams::new(), DhParams::new()],
        vec![JointType::Revolute, JointType::Prismatic, JointType::Fixed],
        vec![0, 1, 2],
    )
    .unwrap();

    let frames = forward_kinematics(&model, &[0.0, 0.0]);
    let tip = frames[model.len() - 1];
    assert!(tip.abs_diff_eq(DMat4::IDENTITY, 1e-12));

    let engine = TransformEngine::new(&model);
    let values: JointValues = model.variables().into_iter().map(|v| (v.name, 0.0)).collect();
    let symbolic = engine.evaluate(3, &values).unwrap().into_result(3).unwrap();
    assert!(symbolic.abs_diff_eq(DMat4::IDENTITY, 1e-12));
}

#[test]
fn drawing_leaves_stack_depth_unchanged() {
    let model = dhview::Sample::TwoArm.build().unwrap();
    let mut scene = SceneGraph::from_model(&model);
    scene.init_geometry(0.1);

    let mut canvas = DrawQueue::new();
    canvas.push();
    canvas.push();
    scene.draw(&mut canvas, &SceneStyle::default());
    assert_eq!(canvas.depth(), 2);
}

#[test]
fn table_round_trip_preserves_parents_and_values() {
    let model = dhview::Sample::TwoArm.build().unwrap();
    let json = serde_json::to_string(&model.to_table()).unwrap();
    let rebuilt = dhview::robot_from_json(&json).unwrap();

    assert_eq!(rebuilt.parents(), model.parents());
    for i in 0..model.len() {
        assert_eq!(rebuilt.params(i), model.params(i));
        assert_eq!(rebuilt.joint_type(i), model.joint_type(i));
    }
}

#[test]
fn set_q_is_idempotent() {
    let model = planar_2r();
    let mut once = SceneGraph::from_model(&model);
    let mut twice = once.clone();
    once.set_q(1, 0.4);
    twice.set_q(1, 0.4);
    twice.set_q(1, 0.4);
    assert_eq!(once.world_transforms(), twice.world_transforms());
    assert_eq!(once.joint_vector(), twice.joint_vector());
}

#[test]
fn planar_chain_at_ninety_degrees() {
    let mut view = RobotView::default();
    view.load_model(planar_2r());
    view.apply_pose(&JointValues::new().with("q1", 90.0).with("q2", 0.0));

    let frames = view.frame_transforms();
    let joint2 = frames[1].w_axis.truncate();
    let tip = frames[2].w_axis.truncate();
    assert!(joint2.abs_diff_eq(DVec3::new(0.0, 1.0, 0.0), 1e-6));
    assert!(tip.abs_diff_eq(DVec3::new(0.0, 2.0, 0.0), 1e-6));

    let fk = forward_kinematics(view.model().unwrap(), &[90f64.to_radians(), 0.0]);
    assert_relative_eq!(fk[2].w_axis.y, tip.y, epsilon = 1e-9);
}

#[test]
fn camera_stays_in_range() {
    let mut camera = OrbitCamera::new();
    for _ in 0..50 {
        camera.rotate(37.0, 13.0);
        camera.zoom(1.7);
        assert!((-89.0..=89.0).contains(&camera.elevation));
        assert!((0.0..360.0).contains(&camera.azimuth));
        assert!(camera.distance <= camera.max_distance);
    }
    for _ in 0..50 {
        camera.rotate(-91.0, -29.0);
        camera.zoom(0.3);
        assert!((-89.0..=89.0).contains(&camera.elevation));
        assert!((0.0..360.0).contains(&camera.azimuth));
        assert!(camera.distance >= camera.min_distance);
    }
    camera.reset();
    assert_eq!(
        (camera.distance, camera.azimuth, camera.elevation),
        (3.0, 45.0, 30.0)
    );
}

#[test]
fn bad_parent_is_a_structure_error() {
    let err = JointModel::build(
        vec![DhParams::new().theta("q1"), DhParams::new().theta("q2")],
        vec![JointType::Revolute; 2],
        vec![0, 5],
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ModelError::Structure(StructureError::ParentOutOfRange { .. })
    ));

    // the view keeps showing nothing rather than a partial robot
    let mut view = RobotView::default();
    assert!(
        view.load(
            vec![DhParams::new().theta("q1")],
            vec![JointType::Revolute],
            vec![1],
        )
        .is_err()
    );
    assert!(view.scene().is_none());
}

#[test]
fn joint_variable_cannot_be_a_constant_elsewhere() {
    let err = JointModel::build(
        vec![
            DhParams::new().theta("q1").r(1.0),
            DhParams::new().theta("q2").r("q1"),
        ],
        vec![JointType::Revolute; 2],
        vec![0, 1],
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ModelError::Parameter(ParameterError::VariableInFixedSlot { joint: 2, .. })
    ));

    // the same mistake made through an edit is refused and the view keeps
    // agreeing with the engine
    let mut view = RobotView::default();
    view.load_model(planar_2r());
    assert!(view.mutate(2, DhField::R, DhValue::symbol("q1")).is_err());
    view.apply_pose(&JointValues::new().with("q1", 90.0).with("q2", 0.0));
    let engine_tip = view.evaluate(2).unwrap().into_result(2).unwrap();
    let scene_tip = view.frame_transforms()[2];
    assert!(engine_tip.abs_diff_eq(scene_tip, 1e-9));
}

#[test]
fn camera_limits_from_config_are_validated() {
    for text in [
        r#"{ "camera": { "min_distance": 5, "max_distance": 1 } }"#,
        r#"{ "camera": { "min_distance": 0 } }"#,
        r#"{ "camera": { "min_distance": -1, "max_distance": 4 } }"#,
    ] {
        let err = Config::from_json(text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }), "{text}");
    }

    let config = Config::from_json(r#"{ "camera": { "min_distance": 1, "max_distance": 4 } }"#)
        .unwrap();
    let mut camera = config.camera.orbit_camera();
    for _ in 0..200 {
        camera.zoom(0.5);
    }
    assert_eq!(camera.distance, 1.0);
    assert!(camera.camera().view_matrix().is_finite());
}

#[test]
fn base_frame_cannot_be_edited() {
    let mut model = planar_2r();
    assert!(matches!(
        model.mutate(0, DhField::D, 1.0),
        Err(ParameterError::IndexOutOfRange { joint: 0, .. })
    ));

    let rebuilt = JointModel::from_table(model.to_table()).unwrap();
    assert_eq!(rebuilt, model);

    let scene = SceneGraph::from_model(&model);
    let engine = TransformEngine::new(&model);
    let values = JointValues::new().with("q1", 0.0).with("q2", 0.0);
    for (frame, world) in scene.world_transforms().into_iter().enumerate() {
        let m = engine.evaluate(frame, &values).unwrap().into_result(frame).unwrap();
        assert!(m.abs_diff_eq(world, 1e-12));
    }
}

#[test]
fn long_chain_paths_agree() {
    let n = 16;
    let dh = (1..=n)
        .map(|i| {
            let row = DhParams::new()
                .theta(DhValue::symbol(format!("q{i}")))
                .r(0.2)
                .alpha(if i % 2 == 0 { 0.5 } else { -0.3 });
            if i % 3 == 0 { row.d(DhValue::symbol("h")) } else { row }
        })
        .collect();
    let model = JointModel::build(dh, vec![JointType::Revolute; n], (0..n).collect())
        .unwrap()
        .with_constants([("h".to_string(), 0.1)].into_iter().collect());

    let pose: JointValues = (1..=n).map(|i| (format!("q{i}"), 5.0 * i as f64)).collect();
    let q: Vec<f64> = (1..=n).map(|i| (5.0 * i as f64).to_radians()).collect();

    let mut view = RobotView::default();
    view.load_model(model.clone());
    view.apply_pose(&pose);

    let fk = forward_kinematics(&model, &q);
    let scene = view.frame_transforms();
    let engine = TransformEngine::new(&model);
    for (frame, evaluation) in engine.evaluate_all(&pose).into_iter().enumerate() {
        let m = evaluation.into_result(frame).unwrap();
        assert!(m.abs_diff_eq(fk[frame], 1e-9), "frame {frame}");
        assert!(scene[frame].abs_diff_eq(fk[frame], 1e-9), "frame {frame}");
    }

    let relative = view.evaluate_relative(4, n).unwrap().into_result(n).unwrap();
    assert!(relative.abs_diff_eq(fk[4].inverse() * fk[n], 1e-9));
}
