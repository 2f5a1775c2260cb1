use crate::config::FieldTable;
use crate::error::ReconError;
use crate::model::{Field, FieldMap, ResolvedColumn};

/// Map every configured field to a column of `labels`.
///
/// Required fields that resolve to nothing fail with `MissingColumn`;
/// optional ones are left out of the map.
pub fn resolve_columns(
    table: &str,
    labels: &[String],
    fields: &FieldTable,
) -> Result<FieldMap, ReconError> {
    let mut map = FieldMap::default();

    for field in Field::ALL {
        let Some(spec) = fields.get(field) else {
            continue;
        };

        match resolve_column(labels, &spec.synonyms) {
            Some(column) => {
                log::debug!("{table}: {field} -> '{}' (column {})", column.label, column.index + 1);
                map.insert(field, column);
            }
            None if spec.required => {
                return Err(ReconError::MissingColumn {
                    table: table.to_string(),
                    field: field.to_string(),
                    synonyms: spec.synonyms.clone(),
                });
            }
            None => {
                log::warn!("{table}: optional field '{field}' not found; matching without it");
            }
        }
    }

    Ok(map)
}

/// Two passes over the synonyms: exact (case-insensitive) first, then containment.
///
/// In both passes the synonym order dominates: the first synonym is tried
/// against every column before the second one is considered.
pub fn resolve_column(labels: &[String], synonyms: &[String]) -> Option<ResolvedColumn> {
    let folded: Vec<String> = labels.iter().map(|l| fold(l)).collect();

    let found = synonyms
        .iter()
        .find_map(|syn| {
            let syn = fold(syn);
            folded.iter().position(|l| !l.is_empty() && *l == syn)
        })
        .or_else(|| {
            synonyms.iter().find_map(|syn| {
                let parts: Vec<String> = syn
                    .split('+')
                    .map(fold)
                    .filter(|p| !p.is_empty())
                    .collect();
                if parts.is_empty() {
                    return None;
                }
                folded
                    .iter()
                    .position(|l| parts.iter().all(|p| l.contains(p.as_str())))
            })
        })?;

    Some(ResolvedColumn {
        index: found,
        label: labels[found].clone(),
    })
}

fn fold(s: &str) -> String {
    s.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldSpec, SyncConfig};

    fn labels(l: &[&str]) -> Vec<String> {
        l.iter().map(|s| s.to_string()).collect()
    }

    fn syns(s: &[&str]) -> Vec<String> {
        s.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn exact_beats_substring_regardless_of_position() {
        let cols = labels(&["CONTENEDOR ANTERIOR", "Contenedor"]);
        let col = resolve_column(&cols, &syns(&["contenedor"])).unwrap();
        assert_eq!(col.index, 1);
        assert_eq!(col.label, "Contenedor");
    }

    #[test]
    fn synonym_order_wins_over_column_order() {
        let cols = labels(&["CONTAINER", "NUMERO CONTENEDOR"]);
        let col = resolve_column(&cols, &syns(&["NUMERO CONTENEDOR", "CONTAINER"])).unwrap();
        assert_eq!(col.index, 1);
    }

    #[test]
    fn substring_pass_when_no_exact() {
        let cols = labels(&["FECHA", "Nº CONTENEDOR / BOOKING", "PLACA"]);
        let col = resolve_column(&cols, &syns(&["NUMERO CONTENEDOR", "CONTENEDOR"])).unwrap();
        assert_eq!(col.index, 1);
    }

    #[test]
    fn conjunction_synonym() {
        let cols = labels(&["PLACA TRACTO", "PLACA (CARRETA)", "HORA LLEGADA", "SALIDA - HORA"]);
        assert_eq!(resolve_column(&cols, &syns(&["PLACA+CARRETA"])).unwrap().index, 1);
        assert_eq!(resolve_column(&cols, &syns(&["HORA+SALIDA"])).unwrap().index, 3);
    }

    #[test]
    fn unresolved_returns_none() {
        let cols = labels(&["A", "B", ""]);
        assert!(resolve_column(&cols, &syns(&["Fecha"])).is_none());
    }

    #[test]
    fn default_export_table_resolves() {
        let config = SyncConfig::default();
        let cols = labels(&["ITEM", "NUMERO CONTENEDOR", "PLACA DE CARRETA", "HORA DE SALIDA"]);
        let map = resolve_columns("export", &cols, &config.export.fields).unwrap();
        assert_eq!(map.index(Field::Container), Some(1));
        assert_eq!(map.index(Field::Plate), Some(2));
        assert_eq!(map.index(Field::Time), Some(3));
        assert_eq!(map.index(Field::Date), None);
    }

    #[test]
    fn missing_required_field_errors() {
        let config = SyncConfig::default();
        let cols = labels(&["Contenedor", "Placa 2", "Fecha"]);
        let err = resolve_columns("destination", &cols, &config.destination.fields).unwrap_err();
        match err {
            ReconError::MissingColumn { table, field, synonyms } => {
                assert_eq!(table, "destination");
                assert_eq!(field, "time");
                assert_eq!(synonyms, vec!["Hr salida QP".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_optional_field_is_left_out() {
        let mut fields = SyncConfig::default().destination.fields;
        fields.container = Some(FieldSpec::optional(&["Contenedor"]));
        let cols = labels(&["Placa 2", "Hr salida QP", "Fecha"]);
        let map = resolve_columns("destination", &cols, &fields).unwrap();
        assert!(map.get(Field::Container).is_none());
        assert_eq!(map.index(Field::Plate), Some(0));
    }
}
