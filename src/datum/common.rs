//! Sub-templates for Plutus types shared by exchange datums.

use super::{
    DefinitionTemplate, ParameterKey, StructuredValue, bytes, constr, constr_capture, custom,
    match_into,
};
use crate::error::AnalyzerError;

/// `AssetClass`: `Constr 0 [policy_id, asset_name]`.
pub fn asset_class(policy: ParameterKey, name: ParameterKey) -> DefinitionTemplate {
    constr(0, vec![bytes(policy), bytes(name)])
}

/// `Credential`: verification key (`Constr 0`) or script (`Constr 1`) hash,
/// the hash is captured either way.
pub fn payment_credential(key: ParameterKey) -> DefinitionTemplate {
    custom(move |value, params| match value {
        StructuredValue::Constr { tag: 0 | 1, fields } => match fields.as_slice() {
            [StructuredValue::Bytes(hash)] => {
                params.insert_bytes(key, hash);
                Ok(())
            }
            _ => Err(AnalyzerError::mismatch("$", "expected credential hash")),
        },
        _ => Err(AnalyzerError::mismatch("$", "expected credential")),
    })
}

/// `StakingCredential`: captures the hash of `StakingHash`, accepts
/// `StakingPtr` without capturing.
pub fn staking_credential(key: ParameterKey) -> DefinitionTemplate {
    let hash = constr(0, vec![payment_credential(key)]);
    custom(move |value, params| match value {
        StructuredValue::Constr { tag: 1, fields } if fields.len() == 3 => Ok(()),
        value => match_into(&hash, value, params),
    })
}

/// `Maybe a`: `Constr 0 [a]` is matched against `inner`, `Constr 1 []`
/// captures nothing.
pub fn optional(inner: DefinitionTemplate) -> DefinitionTemplate {
    custom(move |value, params| match value {
        StructuredValue::Constr { tag: 0, fields } if fields.len() == 1 => {
            match_into(&inner, &fields[0], params)
        }
        StructuredValue::Constr { tag: 1, fields } if fields.is_empty() => Ok(()),
        _ => Err(AnalyzerError::mismatch("$", "expected optional value")),
    })
}

/// Plutus `Address` with optional staking part.
pub fn address(payment: ParameterKey, staking: ParameterKey) -> DefinitionTemplate {
    constr(
        0,
        vec![
            payment_credential(payment),
            optional(staking_credential(staking)),
        ],
    )
}

/// `Bool`: `Constr 0 []` is false, `Constr 1 []` is true, captured as 0/1.
pub fn boolean(key: ParameterKey) -> DefinitionTemplate {
    let flag = constr_capture(key, vec![]);
    custom(move |value, params| match value {
        StructuredValue::Constr { tag: 0 | 1, .. } => match_into(&flag, value, params),
        _ => Err(AnalyzerError::mismatch("$", "expected bool")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::match_template;

    fn plutus_address(pkh: &str, skh: Option<&str>) -> StructuredValue {
        let staking = match skh {
            Some(skh) => StructuredValue::constr(
                0,
                vec![StructuredValue::constr(
                    0,
                    vec![StructuredValue::constr(
                        0,
                        vec![StructuredValue::bytes_hex(skh)],
                    )],
                )],
            ),
            None => StructuredValue::constr(1, vec![]),
        };
        StructuredValue::constr(
            0,
            vec![
                StructuredValue::constr(0, vec![StructuredValue::bytes_hex(pkh)]),
                staking,
            ],
        )
    }

    #[test]
    fn test_address_with_and_without_staking() {
        let template = address(
            ParameterKey::SenderPubKeyHash,
            ParameterKey::SenderStakingKeyHash,
        );

        let params = match_template(&template, &plutus_address("aa", Some("bb"))).unwrap();
        assert_eq!(params.bytes(ParameterKey::SenderPubKeyHash).unwrap(), "aa");
        assert_eq!(params.bytes(ParameterKey::SenderStakingKeyHash).unwrap(), "bb");

        let params = match_template(&template, &plutus_address("aa", None)).unwrap();
        assert_eq!(params.bytes(ParameterKey::SenderPubKeyHash).unwrap(), "aa");
        assert!(!params.contains(ParameterKey::SenderStakingKeyHash));
    }

    #[test]
    fn test_staking_pointer_is_accepted() {
        let pointer = StructuredValue::constr(
            1,
            vec![
                StructuredValue::int(1),
                StructuredValue::int(2),
                StructuredValue::int(3),
            ],
        );
        let params =
            match_template(&staking_credential(ParameterKey::SenderStakingKeyHash), &pointer)
                .unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn test_boolean() {
        let template = boolean(ParameterKey::Direction);
        let params = match_template(&template, &StructuredValue::constr(1, vec![])).unwrap();
        assert_eq!(params.small(ParameterKey::Direction).unwrap(), 1);
        assert!(
            match_template(&template, &StructuredValue::constr(2, vec![]))
                .unwrap_err()
                .is_mismatch()
        );
    }

    #[test]
    fn test_optional_rejects_other_shapes() {
        let template = optional(bytes(ParameterKey::PoolIdentifier));
        assert!(
            match_template(&template, &StructuredValue::int(0))
                .unwrap_err()
                .is_mismatch()
        );
        let params = match_template(
            &template,
            &StructuredValue::constr(0, vec![StructuredValue::bytes_hex("01")]),
        )
        .unwrap();
        assert_eq!(params.bytes(ParameterKey::PoolIdentifier).unwrap(), "01");
    }
}
