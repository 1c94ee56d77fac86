use atlas_annotation::{
    AnnotationEngine, AnnotationError, AnnotationVolume, CoordinateMode, SpatialTransform, Table,
    Terminology, Value,
};
use nalgebra::Matrix3;
use ndarray::Array3;
use proptest::prelude::*;

const SIZE: (usize, usize, usize) = (5, 6, 7); // (z, y, x)
const REGIONS: u32 = 8;

fn engine(seed: u32) -> AnnotationEngine {
    // value 7 is deliberately absent from the terminology
    let labels = Array3::from_shape_fn(SIZE, |(z, y, x)| {
        (x as u32 * 3 + y as u32 * 5 + z as u32 * 7 + seed) % REGIONS
    });
    let transform = SpatialTransform::new(
        [-3.0, 1.5, 20.0],
        [0.5, 1.0, 2.5],
        Matrix3::new(0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, -1.0),
    )
    .unwrap();

    let mut table = Table::new([
        "annotation_value",
        "abbreviation",
        "name",
        "descendant_annotation_values",
    ])
    .unwrap();
    for value in 0..REGIONS - 1 {
        table
            .push_row(vec![
                Value::Int(value as i64),
                format!("R{value}").into(),
                format!("Region {value}").into(),
                Value::Int(value as i64),
            ])
            .unwrap();
    }

    AnnotationEngine::new(
        AnnotationVolume::new(labels, transform),
        Terminology::load(&table).unwrap(),
    )
}

fn single_row(point: [f64; 3]) -> Table {
    let mut table = Table::new(["x", "y", "z"]).unwrap();
    table
        .push_row(point.iter().map(|&c| Value::Float(c)).collect())
        .unwrap();
    table
}

fn mode_strategy() -> impl Strategy<Value = CoordinateMode> {
    prop_oneof![
        Just(CoordinateMode::Index),
        Just(CoordinateMode::Physical),
        Just(CoordinateMode::PhysicalAlternate),
    ]
}

proptest! {
    #[test]
    fn index_mode_matches_direct_lookup(
        seed in 0u32..8,
        x in 0usize..7, y in 0usize..6, z in 0usize..5,
    ) {
        let engine = engine(seed);
        let value = engine.volume().labels()[[z, y, x]];
        let result = engine.label_point([x as f64, y as f64, z as f64], CoordinateMode::Index);
        match engine.terminology().lookup_by_value(value) {
            Ok(region) => {
                prop_assert_eq!(
                    result.unwrap(),
                    (region.abbreviation.as_str(), region.name.as_str())
                );
            }
            Err(_) => {
                prop_assert!(matches!(result, Err(AnnotationError::UnknownRegion(_))));
            }
        }
    }

    #[test]
    fn out_of_bounds_fails_scalar_but_not_batch(
        x in -20i64..27, y in -20i64..26, z in -20i64..25,
    ) {
        let inside = (0..7).contains(&x) && (0..6).contains(&y) && (0..5).contains(&z);
        prop_assume!(!inside);

        let engine = engine(0);
        let point = [x as f64, y as f64, z as f64];
        prop_assert!(
            matches!(
                engine.label_point(point, CoordinateMode::Index),
                Err(AnnotationError::OutOfBounds { .. })
            ),
            "point {:?} should be out of bounds",
            point
        );

        let output = engine.label_table(&single_row(point), CoordinateMode::Index).unwrap();
        prop_assert_eq!(output.rows()[0][3].clone(), Value::from(""));
        prop_assert_eq!(output.rows()[0][4].clone(), Value::from(""));
    }

    #[test]
    fn batch_agrees_with_scalar(
        mode in mode_strategy(),
        points in prop::collection::vec(
            (-10.0f64..30.0, -10.0f64..30.0, -10.0f64..30.0),
            0..40,
        ),
    ) {
        let engine = engine(3);
        let mut table = Table::new(["x", "y", "z"]).unwrap();
        for &(x, y, z) in &points {
            table.push_row(vec![x.into(), y.into(), z.into()]).unwrap();
        }

        let output = engine.label_table(&table, mode).unwrap();
        prop_assert_eq!(output.len(), points.len());

        for (row, &(x, y, z)) in output.rows().iter().zip(&points) {
            prop_assert_eq!(&row[0], &Value::Float(x));
            let expected = match engine.label_point([x, y, z], mode) {
                Ok((abbreviation, name)) => (Value::from(abbreviation), Value::from(name)),
                Err(_) => (Value::from(""), Value::from("")),
            };
            prop_assert_eq!((row[3].clone(), row[4].clone()), expected);
        }
    }

    #[test]
    fn leaf_masks_are_confined_and_stable(seed in 0u32..8, value in 0u32..7) {
        let engine = engine(seed);
        let abbreviation = format!("R{value}");
        let mask = engine.build_region_mask(&abbreviation).unwrap();

        for (m, source) in mask.labels().iter().zip(engine.volume().labels().iter()) {
            prop_assert_eq!(*m, if *source == value { value } else { 0 });
        }
        prop_assert_eq!(&mask, &engine.build_region_mask(&abbreviation).unwrap());
    }
}
