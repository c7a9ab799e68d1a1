//! Storing and reading back every type class, with 0, 1 and many elements.

use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use obs_engines::types::StorageType;
use obs_engines::{
    BasicType, Charset, CompoundField, DateTimeRecord, EngineKind, ErrorKind, Group, StringLength,
    TypeClass, TypeDescriptor, VariableCreationParams,
};
use test_utils::{assert_approx_eq, assert_error_kind, datetimes, each_engine, engine, station_names};

fn roundtrip<T>(root: &Group, name: &str, values: &[T])
where
    T: StorageType + Clone + PartialEq + Debug,
{
    for (suffix, slice) in [("0", &values[..0]), ("1", &values[..1]), ("n", values)] {
        let full = format!("{}_{}", name, suffix);
        let var = root
            .vars()
            .create::<T>(&full, &[slice.len() as u64])
            .unwrap();
        var.write(slice).unwrap();
        assert_eq!(var.read::<T>().unwrap(), slice.to_vec(), "{}", full);
        assert!(var.is_a::<T>().unwrap());
    }
}

#[test]
fn test_fundamental_types() {
    for (_, root) in each_engine() {
        roundtrip::<i8>(&root, "i8", &[i8::MIN, -1, 0, i8::MAX]);
        roundtrip::<i16>(&root, "i16", &[i16::MIN, 3, i16::MAX]);
        roundtrip::<i32>(&root, "i32", &[-7, 0, 7, i32::MAX]);
        roundtrip::<i64>(&root, "i64", &[i64::MIN, 1, i64::MAX]);
        roundtrip::<u8>(&root, "u8", &[0, 128, 255]);
        roundtrip::<u16>(&root, "u16", &[1, u16::MAX]);
        roundtrip::<u32>(&root, "u32", &[0, 42, u32::MAX]);
        roundtrip::<u64>(&root, "u64", &[u64::MAX, 0, 9]);
        roundtrip::<f32>(&root, "f32", &[-1.5, 0.0, 3.25e10]);
        roundtrip::<f64>(&root, "f64", &[f64::MIN_POSITIVE, -2.5, 1e300]);
        roundtrip::<bool>(&root, "bool", &[true, false, true]);

        let v = root.vars().open("i16_n").unwrap();
        assert_eq!(v.basic_type().unwrap(), BasicType::Int16);
        assert_eq!(v.data_type().unwrap().size(), 2);
        assert!(v.data_type().unwrap().is_signed());
    }
}

#[test]
fn test_variable_length_strings() {
    for (_, root) in each_engine() {
        roundtrip::<String>(&root, "vlen", &station_names(6));

        let var = root.vars().create::<String>("ids", &[3]).unwrap();
        var.write_strings(&["", "Ωmega", "KAUS"]).unwrap();
        assert_eq!(var.read_strings().unwrap(), vec!["", "Ωmega", "KAUS"]);
    }
}

#[test]
fn test_fixed_length_strings() {
    for (kind, root) in each_engine() {
        let t = root
            .type_provider()
            .make_string_type(6, Charset::Ascii)
            .unwrap();
        assert_eq!(t.string_length(), Some(StringLength::Fixed(6)));
        assert_eq!(t.charset(), Some(Charset::Ascii));

        let var = root
            .vars()
            .create_with_type("station_id", &t, &[3], &[3], VariableCreationParams::new())
            .unwrap();
        var.write_strings(&["KAUS", "PAJN", "EGLL12"]).unwrap();
        assert_eq!(
            var.read_strings().unwrap(),
            vec!["KAUS", "PAJN", "EGLL12"],
            "{:?}",
            kind
        );
        assert_error_kind!(var.write_strings(&["a", "b", "TOOLONG"]), ErrorKind::InvalidArgument);
        assert_error_kind!(var.read::<String>(), ErrorKind::TypeMismatch);
    }
}

#[test]
fn test_fixed_arrays() {
    for (_, root) in each_engine() {
        roundtrip::<[f32; 3]>(
            &root,
            "wind",
            &[[1.0, 2.0, 3.0], [-1.0, 0.5, 0.0], [9.0, 9.0, 9.0]],
        );

        let t = root
            .type_provider()
            .make_array_type(&[2, 3], BasicType::Int16)
            .unwrap();
        assert_eq!(t.class(), TypeClass::FixedArray);
        assert_eq!(t.dimensions(), &[2, 3]);
        assert_eq!(t.size(), 12);

        assert_error_kind!(
            root.type_provider().make_array_type(&[0], BasicType::Int16),
            ErrorKind::InvalidArgument
        );
    }
}

#[test]
fn test_time_values() {
    for (_, root) in each_engine() {
        let times = datetimes(4, 90);
        roundtrip::<DateTime<Utc>>(&root, "time", &times);

        let var = root.vars().open("time_n").unwrap();
        let seconds = var.read::<i64>().unwrap();
        assert_eq!(seconds[1] - seconds[0], 90 * 60);

        roundtrip::<Duration>(
            &root,
            "offset",
            &[Duration::minutes(-30), Duration::zero(), Duration::hours(6)],
        );
    }
}

#[test]
fn test_enum_and_compound_on_chunked_engine() {
    let root = engine(EngineKind::Chunked);

    let quality = root
        .type_provider()
        .make_enum_type(BasicType::Int32, &[("good", 0), ("suspect", 1), ("bad", 2)])
        .unwrap();
    assert_eq!(quality.enum_members().len(), 3);
    let flags = root
        .vars()
        .create_with_type("qc", &quality, &[3], &[3], VariableCreationParams::new())
        .unwrap();
    flags.write(&[0i32, 2, 1]).unwrap();
    assert_eq!(flags.read::<i32>().unwrap(), vec![0, 2, 1]);
    assert_eq!(flags.data_type().unwrap().class(), TypeClass::Enum);
    assert_error_kind!(flags.read::<i64>(), ErrorKind::TypeMismatch);

    roundtrip::<DateTimeRecord>(
        &root,
        "datetime",
        &[
            DateTimeRecord::new(20240101, 0),
            DateTimeRecord::new(20240101, 123000),
            DateTimeRecord::new(20241231, 235959),
        ],
    );

    let wind = root
        .type_provider()
        .make_compound_type(
            8,
            vec![
                CompoundField {
                    name: "u".into(),
                    offset: 0,
                    field_type: TypeDescriptor::Fundamental(BasicType::Float32),
                },
                CompoundField {
                    name: "v".into(),
                    offset: 4,
                    field_type: TypeDescriptor::Fundamental(BasicType::Float32),
                },
            ],
        )
        .unwrap();
    assert_eq!(wind.compound_fields().len(), 2);
    let committed = root.types().commit("wind_t", &wind).unwrap();
    assert_eq!(root.types().open("wind_t").unwrap().descriptor(), committed.descriptor());
}

#[test]
fn test_obsstore_rejects_enum_and_compound() {
    let root = engine(EngineKind::ObsStore);
    assert_error_kind!(
        root.type_provider()
            .make_enum_type(BasicType::Int8, &[("a", 0)]),
        ErrorKind::UnsupportedType
    );
    assert_error_kind!(
        root.vars().create::<DateTimeRecord>("datetime", &[2]),
        ErrorKind::UnsupportedType
    );
    assert!(!root.vars().exists("datetime").unwrap());
    assert_error_kind!(
        root.types().commit(
            "rec",
            &engine(EngineKind::Chunked)
                .type_provider()
                .make_type_for::<DateTimeRecord>()
                .unwrap()
        ),
        ErrorKind::UnsupportedType
    );
}

#[test]
fn test_attribute_types() {
    for (_, root) in each_engine() {
        let atts = root.atts();
        atts.add::<f64>("bounds", &[-90.0, 90.0], &[2]).unwrap();
        atts.add::<u8>("flag", &[1], &[1]).unwrap();
        atts.add::<DateTime<Utc>>("created", &datetimes(1, 0), &[1]).unwrap();
        atts.add_strings("history", &["created", "thinned"]).unwrap();

        let bounds = atts.read_values::<f64>("bounds").unwrap();
        assert_approx_eq!(bounds[0], -90.0, 1e-12);
        assert_approx_eq!(bounds[1], 90.0, 1e-12);
        assert_eq!(atts.read_values::<u8>("flag").unwrap(), vec![1]);
        assert_eq!(
            atts.read_values::<DateTime<Utc>>("created").unwrap(),
            datetimes(1, 0)
        );
        assert_eq!(
            atts.open("history").unwrap().read_strings().unwrap(),
            vec!["created", "thinned"]
        );
        assert!(atts.open("flag").unwrap().is_a::<u8>().unwrap());
    }
}
