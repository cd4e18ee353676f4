//! Versioned binary bandit-model blob format (`spec.md` §6): a fixed header
//! followed by one block per arm. Loaders reject mismatched dimension or
//! unknown version with a typed `ModelLoadError`/`ModelCorrupt` rather than
//! guessing. Float format is fixed to little-endian `f64` throughout (the
//! spec leaves float32-vs-float64 an implementation choice; `f64` matches
//! every other numeric type in this crate).

use crate::error::EngineError;

pub const MAGIC: [u8; 4] = *b"LUCB";
pub const FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnerKind {
    LinUcb = 1,
    Ensemble = 2,
}

impl LearnerKind {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(LearnerKind::LinUcb),
            2 => Some(LearnerKind::Ensemble),
            _ => None,
        }
    }
}

/// One arm's ridge-regression state, flat row-major `A` plus `b`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmBlob {
    pub action_index: u32,
    pub a: Vec<f64>,
    pub b: Vec<f64>,
}

/// header: magic(4) + format_version(2) + learner_kind(1) + reserved(1) +
/// dimension(4) + arm_count(4) = 16 bytes.
const HEADER_LEN: usize = 16;

pub fn encode_linucb(dimension: usize, arms: &[ArmBlob]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + arms.len() * (4 + dimension * dimension * 8 + dimension * 8));
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.push(LearnerKind::LinUcb as u8);
    out.push(0); // reserved
    out.extend_from_slice(&(dimension as u32).to_le_bytes());
    out.extend_from_slice(&(arms.len() as u32).to_le_bytes());

    for arm in arms {
        out.extend_from_slice(&arm.action_index.to_le_bytes());
        for v in &arm.a {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in &arm.b {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    out
}

pub fn decode_linucb(bytes: &[u8]) -> Result<(usize, Vec<ArmBlob>), EngineError> {
    if bytes.len() < HEADER_LEN {
        return Err(EngineError::ModelCorrupt("blob shorter than header".into()));
    }
    if bytes[0..4] != MAGIC {
        return Err(EngineError::ModelLoadError("bad magic".into()));
    }
    let format_version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if format_version != FORMAT_VERSION {
        return Err(EngineError::ModelLoadError(format!(
            "unsupported format version {format_version}"
        )));
    }
    let learner_kind = LearnerKind::from_u8(bytes[6])
        .ok_or_else(|| EngineError::ModelLoadError(format!("unknown learner kind {}", bytes[6])))?;
    if learner_kind != LearnerKind::LinUcb {
        return Err(EngineError::ModelLoadError("expected LinUcb learner kind".into()));
    }
    let dimension = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let arm_count = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
    if dimension == 0 {
        return Err(EngineError::ModelCorrupt("dimension is zero".into()));
    }

    let arm_block_len = 4 + dimension * 8 + dimension * 8;
    let expected_len = HEADER_LEN + arm_count * arm_block_len;
    if bytes.len() != expected_len {
        return Err(EngineError::ModelCorrupt(format!(
            "expected {expected_len} bytes for {arm_count} arms at dimension {dimension}, got {}",
            bytes.len()
        )));
    }

    let mut arms = Vec::with_capacity(arm_count);
    let mut offset = HEADER_LEN;
    for _ in 0..arm_count {
        let action_index = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
        offset += 4;
        let mut a = Vec::with_capacity(dimension * dimension);
        for _ in 0..dimension * dimension {
            a.push(f64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap()));
            offset += 8;
        }
        let mut b = Vec::with_capacity(dimension);
        for _ in 0..dimension {
            b.push(f64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap()));
            offset += 8;
        }
        if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
            return Err(EngineError::ModelCorrupt(format!("non-finite value in arm {action_index}")));
        }
        arms.push(ArmBlob { action_index, a, b });
    }

    Ok((dimension, arms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_arms(dimension: usize) -> Vec<ArmBlob> {
        vec![
            ArmBlob { action_index: 0, a: vec![1.0; dimension * dimension], b: vec![0.5; dimension] },
            ArmBlob { action_index: 3, a: vec![2.5; dimension * dimension], b: vec![-0.25; dimension] },
        ]
    }

    #[test]
    fn round_trips_losslessly() {
        let arms = sample_arms(4);
        let bytes = encode_linucb(4, &arms);
        let (dim, decoded) = decode_linucb(&bytes).unwrap();
        assert_eq!(dim, 4);
        assert_eq!(decoded, arms);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = encode_linucb(2, &sample_arms(2));
        bytes[0] = b'X';
        assert!(matches!(decode_linucb(&bytes), Err(EngineError::ModelLoadError(_))));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = encode_linucb(2, &sample_arms(2));
        bytes[4..6].copy_from_slice(&99u16.to_le_bytes());
        assert!(matches!(decode_linucb(&bytes), Err(EngineError::ModelLoadError(_))));
    }

    #[test]
    fn rejects_truncated_blob() {
        let bytes = encode_linucb(3, &sample_arms(3));
        let truncated = &bytes[..bytes.len() - 4];
        assert!(matches!(decode_linucb(truncated), Err(EngineError::ModelCorrupt(_))));
    }

    #[test]
    fn rejects_non_finite_values() {
        let mut arms = sample_arms(2);
        arms[0].a[0] = f64::NAN;
        let bytes = encode_linucb(2, &arms);
        assert!(matches!(decode_linucb(&bytes), Err(EngineError::ModelCorrupt(_))));
    }

    #[test]
    fn empty_arm_list_round_trips() {
        let bytes = encode_linucb(5, &[]);
        let (dim, arms) = decode_linucb(&bytes).unwrap();
        assert_eq!(dim, 5);
        assert!(arms.is_empty());
    }
}
