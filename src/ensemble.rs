//! AND/OR ensemble combination of canonical masks

use crate::error::{Result, SegmentationError};
use crate::orchestrator::ModelMask;
use crate::types::{CanonicalMask, EnsembleOp, EnsembleResult};
use ndarray::Array2;

/// Combine two or more canonical masks into AND and OR ensembles
///
/// Fewer than two masks produce no ensembles (an empty result, not an
/// error). Both combinations are commutative and associative, so the input
/// order only shows up in the recorded member list, never in the pixels.
///
/// # Errors
/// - `ShapeMismatch` when any two masks differ in spatial dimensions; the
///   masks stem from one normalized image, so a mismatch means a
///   misconfigured model descriptor, not bad caller input
pub fn combine(masks: &[ModelMask]) -> Result<Vec<EnsembleResult>> {
    let Some((first, rest)) = masks.split_first() else {
        return Ok(Vec::new());
    };
    if rest.is_empty() {
        return Ok(Vec::new());
    }

    let expected = first.mask.dimensions();
    for entry in rest {
        let actual = entry.mask.dimensions();
        if actual != expected {
            return Err(SegmentationError::shape_mismatch(
                format!(
                    "ensemble of '{}' and '{}'",
                    first.model, entry.model
                ),
                (expected.0 as usize, expected.1 as usize),
                (actual.0 as usize, actual.1 as usize),
            ));
        }
    }

    let mut and_data: Array2<u8> = first.mask.data().clone();
    let mut or_data: Array2<u8> = first.mask.data().clone();
    for entry in rest {
        and_data.zip_mut_with(entry.mask.data(), |a, &b| *a &= b);
        or_data.zip_mut_with(entry.mask.data(), |a, &b| *a |= b);
    }

    let members: Vec<String> = masks.iter().map(|m| m.model.clone()).collect();
    Ok(vec![
        EnsembleResult {
            op: EnsembleOp::And,
            mask: CanonicalMask::from_binary(and_data)?,
            members: members.clone(),
        },
        EnsembleResult {
            op: EnsembleOp::Or,
            mask: CanonicalMask::from_binary(or_data)?,
            members,
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn model_mask(model: &str, data: Array2<u8>) -> ModelMask {
        ModelMask {
            model: model.to_string(),
            mask: CanonicalMask::from_binary(data).unwrap(),
        }
    }

    #[test]
    fn test_and_or_concrete_pair() {
        let m1 = model_mask("HRNet Seg", array![[1u8, 0], [1, 1]]);
        let m2 = model_mask("U2Net Seg", array![[1u8, 1], [0, 1]]);

        let results = combine(&[m1, m2]).unwrap();
        assert_eq!(results.len(), 2);

        let and = &results[0];
        assert_eq!(and.op, EnsembleOp::And);
        assert_eq!(and.mask.data(), &array![[1u8, 0], [0, 1]]);

        let or = &results[1];
        assert_eq!(or.op, EnsembleOp::Or);
        assert_eq!(or.mask.data(), &array![[1u8, 1], [1, 1]]);

        assert_eq!(and.members, vec!["HRNet Seg", "U2Net Seg"]);
    }

    #[test]
    fn test_single_mask_produces_no_ensembles() {
        let m1 = model_mask("HRNet Seg", array![[1u8, 0], [1, 1]]);
        assert!(combine(&[m1]).unwrap().is_empty());
        assert!(combine(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_degenerate_ensemble_of_identical_masks() {
        let data = array![[1u8, 0], [0, 1]];
        let m1 = model_mask("HRNet Seg", data.clone());
        let m2 = model_mask("U2Net Seg", data.clone());

        let results = combine(&[m1, m2]).unwrap();
        assert_eq!(results[0].mask.data(), &data);
        assert_eq!(results[1].mask.data(), &data);
    }

    #[test]
    fn test_commutativity_under_permutation() {
        let masks = [
            model_mask("A", array![[1u8, 0, 1], [0, 1, 0]]),
            model_mask("B", array![[1u8, 1, 0], [0, 1, 1]]),
            model_mask("C", array![[0u8, 1, 1], [1, 1, 0]]),
        ];

        let permutations: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        let reference = combine(&masks).unwrap();
        for perm in permutations {
            let shuffled: Vec<ModelMask> = perm.iter().map(|&i| masks[i].clone()).collect();
            let results = combine(&shuffled).unwrap();
            assert_eq!(results[0].mask, reference[0].mask);
            assert_eq!(results[1].mask, reference[1].mask);
        }
    }

    #[test]
    fn test_and_subset_or_superset() {
        let masks = [
            model_mask("A", array![[1u8, 0, 1], [0, 1, 0]]),
            model_mask("B", array![[1u8, 1, 0], [0, 1, 1]]),
            model_mask("C", array![[0u8, 1, 1], [1, 1, 0]]),
        ];

        let results = combine(&masks).unwrap();
        let and = results[0].mask.data();
        let or = results[1].mask.data();

        for entry in &masks {
            for ((and_v, mask_v), or_v) in
                and.iter().zip(entry.mask.data().iter()).zip(or.iter())
            {
                assert!(and_v <= mask_v, "AND must be a pointwise subset");
                assert!(or_v >= mask_v, "OR must be a pointwise superset");
            }
        }
    }

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let m1 = model_mask("HRNet Seg", Array2::zeros((2, 2)));
        let m2 = model_mask("U2Net Seg", Array2::zeros((3, 3)));

        let err = combine(&[m1, m2]).unwrap_err();
        assert!(matches!(err, SegmentationError::ShapeMismatch { .. }));
        let msg = err.to_string();
        assert!(msg.contains("HRNet Seg"));
        assert!(msg.contains("U2Net Seg"));
    }
}
