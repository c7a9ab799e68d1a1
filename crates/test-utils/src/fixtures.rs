//! Test fixtures: engine roots and a populated observation layout.

use obs_engines::{
    EngineConfig, EngineFactory, EngineKind, Group, ObsResult, Variable, VariableCreationParams,
};

/// Group and variable names of the observation layout.
pub mod layout {
    /// Root attribute that marks a NetCDF-4 style file.
    pub const MARKER_ATTRIBUTE: &str = "_ioda_layout";
    pub const MARKER_VALUE: &str = "ObsGroup";

    pub const LOCATION: &str = "Location";
    pub const OBS_VALUE: &str = "ObsValue";
    pub const META_DATA: &str = "MetaData";

    pub const TEMPERATURE: &str = "ObsValue/air_temperature";
    pub const LATITUDE: &str = "MetaData/latitude";
    pub const LONGITUDE: &str = "MetaData/longitude";
    pub const STATION_ID: &str = "MetaData/station_id";

    /// Number of locations in [`populated`](super::populated).
    pub const NLOCS: u64 = 4;
}

/// Factory with the default configuration.
pub fn factory() -> EngineFactory {
    EngineFactory::new(EngineConfig::default()).expect("default config is valid")
}

/// Root group of a fresh instance of `kind`.
pub fn engine(kind: EngineKind) -> Group {
    factory()
        .create_root_with(kind)
        .expect("engine root can be created")
}

/// One fresh root per engine kind, for tests that must hold on every engine.
pub fn each_engine() -> Vec<(EngineKind, Group)> {
    let factory = factory();
    EngineKind::ALL
        .iter()
        .map(|kind| {
            let root = factory
                .create_root_with(*kind)
                .expect("engine root can be created");
            (*kind, root)
        })
        .collect()
}

/// Handles into the layout built by [`populated`].
pub struct ObsLayout {
    pub root: Group,
    pub location: Variable,
    pub temperature: Variable,
    pub latitude: Variable,
    pub longitude: Variable,
}

/// Build a small observation layout on `root`.
///
/// `Location` is a resizable int32 dimension scale holding 1..=4. The
/// temperature, latitude and longitude variables are float32, one value per
/// location, each with `Location` attached on axis 0.
pub fn populated(root: &Group) -> ObsResult<ObsLayout> {
    let n = layout::NLOCS;
    let vars = root.vars();

    let location = vars.create_with::<i32>(
        layout::LOCATION,
        &[n],
        &[obs_engines::UNLIMITED],
        VariableCreationParams::new(),
    )?;
    location.set_is_dimension_scale(layout::LOCATION)?;
    location.write(&crate::generators::sequence_i32(n as usize, 1))?;

    let float_var = |name: &str, values: Vec<f32>| -> ObsResult<Variable> {
        let var = vars.create::<f32>(name, &[n])?;
        var.attach_dimension_scale(0, &location)?;
        var.write(&values)?;
        Ok(var)
    };

    let temperature = float_var(
        layout::TEMPERATURE,
        crate::generators::ramp_f32(n as usize, 280.0, 0.5),
    )?;
    let latitude = float_var(
        layout::LATITUDE,
        crate::generators::ramp_f32(n as usize, -45.0, 30.0),
    )?;
    let longitude = float_var(
        layout::LONGITUDE,
        crate::generators::ramp_f32(n as usize, 10.0, 90.0),
    )?;

    temperature.atts()?.add_strings("units", &["K"])?;

    Ok(ObsLayout {
        root: root.clone(),
        location,
        temperature,
        latitude,
        longitude,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_engine_covers_all_kinds() {
        let roots = each_engine();
        assert_eq!(roots.len(), EngineKind::ALL.len());
        assert_ne!(
            roots[0].1.engine_id().unwrap(),
            roots[1].1.engine_id().unwrap()
        );
    }

    #[test]
    fn test_populated_layout() {
        for (kind, root) in each_engine() {
            let obs = populated(&root).unwrap();
            assert_eq!(obs.location.read::<i32>().unwrap(), vec![1, 2, 3, 4], "{:?}", kind);
            assert!(obs.temperature.is_dimension_scale_attached(0, &obs.location).unwrap());
            assert!(root.exists(layout::META_DATA).unwrap());
            assert_eq!(
                obs.temperature.atts().unwrap().open("units").unwrap().read_strings().unwrap(),
                vec!["K".to_string()]
            );
        }
    }
}
