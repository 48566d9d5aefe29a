use alloy_primitives::{I256, U256};

use super::{DatumParameters, DefinitionTemplate, ParameterValue, Slot, StructuredValue};
use crate::error::{AnalyzerError, AnalyzerResult};

/// Matches `value` against `template`, returning the captured parameters.
///
/// Any disagreement in shape fails with [`AnalyzerError::DecodeMismatch`]
/// carrying the path of the offending node.
pub fn match_template(
    template: &DefinitionTemplate,
    value: &StructuredValue,
) -> AnalyzerResult<DatumParameters> {
    let mut params = DatumParameters::new();
    match_into(template, value, &mut params)?;
    Ok(params)
}

/// Matches into an existing accumulator, for use from custom matchers.
pub fn match_into(
    template: &DefinitionTemplate,
    value: &StructuredValue,
    params: &mut DatumParameters,
) -> AnalyzerResult<()> {
    match_at(template, value, params, "$")
}

fn match_at(
    template: &DefinitionTemplate,
    value: &StructuredValue,
    params: &mut DatumParameters,
    path: &str,
) -> AnalyzerResult<()> {
    match (template, value) {
        (DefinitionTemplate::Custom(matcher), value) => {
            matcher(value, params).map_err(|e| match e {
                AnalyzerError::DecodeMismatch {
                    path: inner,
                    reason,
                } if inner == "$" => AnalyzerError::mismatch(path, reason),
                e => e,
            })
        }
        (DefinitionTemplate::List(items), StructuredValue::List(values)) => {
            match_fields(items, values, params, path)
        }
        (
            DefinitionTemplate::Constr { tag, fields },
            StructuredValue::Constr {
                tag: actual,
                fields: values,
            },
        ) => {
            match tag {
                Slot::Literal(expected) if expected != actual => {
                    return Err(AnalyzerError::mismatch(
                        path,
                        format!("expected constructor {expected}, got {actual}"),
                    ));
                }
                Slot::Literal(_) => {}
                Slot::Capture(key) => params.insert_int(*key, I256::from_raw(U256::from(*actual))),
            }
            match_fields(fields, values, params, path)
        }
        (DefinitionTemplate::Int(slot), StructuredValue::Int(actual)) => match slot {
            Slot::Literal(expected) if expected != actual => Err(AnalyzerError::mismatch(
                path,
                format!("expected {expected}, got {actual}"),
            )),
            Slot::Literal(_) => Ok(()),
            Slot::Capture(key) => {
                params.insert(*key, ParameterValue::Int(*actual));
                Ok(())
            }
        },
        (DefinitionTemplate::Bytes(slot), StructuredValue::Bytes(actual)) => {
            let actual = hex::encode(actual);
            match slot {
                Slot::Literal(expected) if expected != &actual => Err(AnalyzerError::mismatch(
                    path,
                    format!("expected bytes {expected}, got {actual}"),
                )),
                Slot::Literal(_) => Ok(()),
                Slot::Capture(key) => {
                    params.insert(*key, ParameterValue::Bytes(actual));
                    Ok(())
                }
            }
        }
        (template, value) => Err(AnalyzerError::mismatch(
            path,
            format!("expected {}, got {}", template_kind(template), value.kind()),
        )),
    }
}

fn match_fields(
    templates: &[DefinitionTemplate],
    values: &[StructuredValue],
    params: &mut DatumParameters,
    path: &str,
) -> AnalyzerResult<()> {
    if templates.len() != values.len() {
        return Err(AnalyzerError::mismatch(
            path,
            format!("expected {} fields, got {}", templates.len(), values.len()),
        ));
    }
    for (i, (template, value)) in templates.iter().zip(values).enumerate() {
        match_at(template, value, params, &format!("{path}.{i}"))?;
    }
    Ok(())
}

fn template_kind(template: &DefinitionTemplate) -> &'static str {
    match template {
        DefinitionTemplate::Constr { .. } => "constr",
        DefinitionTemplate::Int(_) => "int",
        DefinitionTemplate::Bytes(_) => "bytes",
        DefinitionTemplate::List(_) => "list",
        DefinitionTemplate::Custom(_) => "custom",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::{
        ParameterKey, bytes, bytes_literal, constr, constr_capture, custom, ignore, int,
        int_literal, list,
    };

    fn sample() -> StructuredValue {
        StructuredValue::constr(
            0,
            vec![
                StructuredValue::bytes_hex("aabb"),
                StructuredValue::List(vec![StructuredValue::int(1), StructuredValue::int(2)]),
                StructuredValue::constr(3, vec![StructuredValue::int(500)]),
            ],
        )
    }

    #[test]
    fn test_match_captures_values() {
        let template = constr(
            0,
            vec![
                bytes(ParameterKey::PoolIdentifier),
                list(vec![int_literal(1), int(ParameterKey::ReserveB)]),
                constr_capture(ParameterKey::Action, vec![int(ParameterKey::MinReceive)]),
            ],
        );
        let params = match_template(&template, &sample()).unwrap();
        assert_eq!(params.bytes(ParameterKey::PoolIdentifier).unwrap(), "aabb");
        assert_eq!(params.amount(ParameterKey::ReserveB).unwrap(), U256::from(2));
        assert_eq!(params.small(ParameterKey::Action).unwrap(), 3);
        assert_eq!(params.amount(ParameterKey::MinReceive).unwrap(), U256::from(500));
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn test_match_reports_path() {
        let template = constr(
            0,
            vec![
                bytes_literal("aabb"),
                list(vec![int_literal(1), int_literal(3)]),
                ignore(),
            ],
        );
        assert_eq!(
            match_template(&template, &sample()),
            Err(AnalyzerError::mismatch("$.1.1", "expected 3, got 2"))
        );
    }

    #[test]
    fn test_match_rejects_shape_disagreements() {
        // wrong tag
        let template = constr(1, vec![ignore(), ignore(), ignore()]);
        assert!(match_template(&template, &sample()).unwrap_err().is_mismatch());
        // wrong arity
        let template = constr(0, vec![ignore(), ignore()]);
        assert!(match_template(&template, &sample()).unwrap_err().is_mismatch());
        // wrong kind
        let template = constr(0, vec![int(ParameterKey::ReserveA), ignore(), ignore()]);
        assert_eq!(
            match_template(&template, &sample()),
            Err(AnalyzerError::mismatch("$.0", "expected int, got bytes"))
        );
        // bytes literal
        let template = constr(0, vec![bytes_literal("AABC"), ignore(), ignore()]);
        assert!(match_template(&template, &sample()).unwrap_err().is_mismatch());
    }

    #[test]
    fn test_custom_is_fully_delegated() {
        let template = constr(
            0,
            vec![
                ignore(),
                custom(|value, params| match value {
                    StructuredValue::List(items) => {
                        params.insert_int(
                            ParameterKey::LqBound,
                            I256::try_from(items.len() as i64).unwrap(),
                        );
                        Ok(())
                    }
                    _ => Err(AnalyzerError::mismatch("$", "expected list")),
                }),
                custom(|_, _| Err(AnalyzerError::mismatch("$", "rejected"))),
            ],
        );
        assert_eq!(
            match_template(&template, &sample()),
            Err(AnalyzerError::mismatch("$.2", "rejected"))
        );
    }

    #[test]
    fn test_template_debug_skips_closures() {
        let rendered = format!("{:?}", list(vec![ignore(), int_literal(1)]));
        assert!(rendered.starts_with("List([Custom(..)"));
    }
}
