//! Attaching, detaching and discovering dimension scales.

use obs_engines::{EngineKind, ErrorKind, VariableCreationParams, UNLIMITED};
use test_utils::{assert_error_kind, each_engine, engine, factory, populated};

#[test]
fn test_attach_is_not_repeatable() {
    for (_, root) in each_engine() {
        let obs = populated(&root).unwrap();
        let err = assert_error_kind!(
            obs.temperature.attach_dimension_scale(0, &obs.location),
            ErrorKind::DuplicateName
        );
        assert_eq!(
            err.context().get("operation"),
            Some("Variable::attach_dimension_scale")
        );
    }
}

#[test]
fn test_detach_then_detach_again() {
    for (_, root) in each_engine() {
        let obs = populated(&root).unwrap();
        obs.latitude.detach_dimension_scale(0, &obs.location).unwrap();
        assert!(!obs.latitude.is_dimension_scale_attached(0, &obs.location).unwrap());
        // Other links are untouched.
        assert!(obs.longitude.is_dimension_scale_attached(0, &obs.location).unwrap());

        assert_error_kind!(
            obs.latitude.detach_dimension_scale(0, &obs.location),
            ErrorKind::NotFound
        );
        obs.latitude.attach_dimension_scale(0, &obs.location).unwrap();
        assert!(obs.latitude.is_dimension_scale_attached(0, &obs.location).unwrap());
    }
}

#[test]
fn test_axis_must_exist() {
    for (_, root) in each_engine() {
        let obs = populated(&root).unwrap();
        assert_error_kind!(
            obs.temperature.attach_dimension_scale(1, &obs.location),
            ErrorKind::InvalidDimensions
        );
    }
}

#[test]
fn test_links_never_cross_engine_instances() {
    let roots = each_engine();
    let (_, a) = &roots[0];
    let (_, b) = &roots[1];
    let scale = a.vars().create::<i32>("Location", &[2]).unwrap();
    let var = b.vars().create::<f32>("t", &[2]).unwrap();

    assert_error_kind!(var.attach_dimension_scale(0, &scale), ErrorKind::CrossBackendLink);
    assert_error_kind!(var.detach_dimension_scale(0, &scale), ErrorKind::CrossBackendLink);
    assert!(!var.is_dimension_scale_attached(0, &scale).unwrap());

    // Two instances of the same engine are just as separate.
    let factory = factory();
    let c = factory.create_root_with(EngineKind::ObsStore).unwrap();
    let d = factory.create_root_with(EngineKind::ObsStore).unwrap();
    let scale = c.vars().create::<i32>("Location", &[2]).unwrap();
    let var = d.vars().create::<f32>("t", &[2]).unwrap();
    assert_error_kind!(var.attach_dimension_scale(0, &scale), ErrorKind::CrossBackendLink);

    let params = VariableCreationParams::new().attach_dimension_scale(0, &scale);
    assert_error_kind!(
        d.vars().create_with::<f32>("u", &[2], &[2], params),
        ErrorKind::CrossBackendLink
    );
    assert!(!d.vars().exists("u").unwrap());
}

#[test]
fn test_scale_names() {
    for (_, root) in each_engine() {
        let obs = populated(&root).unwrap();
        assert!(obs.location.is_dimension_scale().unwrap());
        assert_eq!(
            obs.location.dimension_scale_name().unwrap().as_deref(),
            Some("Location")
        );
        assert!(!obs.temperature.is_dimension_scale().unwrap());
    }
}

#[test]
fn test_attached_scales_in_the_same_group() {
    for (_, root) in each_engine() {
        let location = root.vars().create::<i32>("Location", &[3]).unwrap();
        let channel = root.vars().create::<i32>("Channel", &[2]).unwrap();
        let bt = root.vars().create::<f32>("brightness", &[3, 2]).unwrap();
        bt.attach_dimension_scale(0, &location).unwrap();
        bt.attach_dimension_scale(1, &channel).unwrap();

        let on_axis0 = bt.attached_dimension_scales(0).unwrap();
        assert_eq!(on_axis0.len(), 1);
        assert_eq!(on_axis0[0].0, "Location");
        assert_eq!(
            on_axis0[0].1.object_id().unwrap(),
            location.object_id().unwrap()
        );

        let candidates = vec![
            ("Channel".to_string(), channel.clone()),
            ("Location".to_string(), location.clone()),
        ];
        let mappings = bt.dimension_scale_mappings(&candidates).unwrap();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].len(), 1);
        assert_eq!(mappings[0][0].0, "Location");
        assert_eq!(mappings[1][0].0, "Channel");
    }
}

#[test]
fn test_create_with_scales_takes_extents_from_scales() {
    for (kind, root) in each_engine() {
        let location = root
            .vars()
            .create_with::<i32>("Location", &[4], &[UNLIMITED], VariableCreationParams::new())
            .unwrap();
        let channel = root.vars().create::<i32>("Channel", &[3]).unwrap();

        let f32_type = root.type_provider().make_type_for::<f32>().unwrap();
        let bt = root
            .vars()
            .create_with_scales(
                "brightness",
                &f32_type,
                &[location.clone(), channel.clone()],
                VariableCreationParams::new(),
            )
            .unwrap();

        let dims = bt.dimensions().unwrap();
        assert_eq!(dims.dims_cur(), &[4, 3], "{:?}", kind);
        assert_eq!(dims.dims_max(), &[UNLIMITED, 3]);
        assert!(bt.is_dimension_scale_attached(0, &location).unwrap());
        assert!(bt.is_dimension_scale_attached(1, &channel).unwrap());

        let grid = root.vars().create::<i32>("grid", &[2, 2]).unwrap();
        assert_error_kind!(
            root.vars().create_with_scales(
                "bad",
                &f32_type,
                &[grid],
                VariableCreationParams::new()
            ),
            ErrorKind::InvalidDimensions
        );
    }
}

#[test]
fn test_removed_scale_drops_its_links() {
    let root = engine(EngineKind::ObsStore);
    let obs = populated(&root).unwrap();
    root.vars().remove("Location").unwrap();
    assert!(!obs.temperature.is_dimension_scale_attached(0, &obs.location).unwrap());
    assert!(obs.temperature.attached_dimension_scales(0).unwrap().is_empty());
}
