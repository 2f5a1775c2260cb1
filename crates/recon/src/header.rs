use std::collections::HashSet;

use crate::config::{HeaderPolicy, HeaderSearch};
use crate::error::ReconError;
use crate::model::RawGrid;

/// Find the first row within `search.max_rows` that carries the header tokens.
///
/// Returns the 0-based row index. On failure the error lists the tokens the
/// closest candidate row was missing.
pub fn locate_header(
    grid: &RawGrid,
    sheet: &str,
    tokens: &[String],
    search: &HeaderSearch,
) -> Result<usize, ReconError> {
    let mut wanted: Vec<String> = Vec::with_capacity(tokens.len());
    for t in tokens {
        let t = fold(t);
        if !wanted.contains(&t) {
            wanted.push(t);
        }
    }
    if wanted.is_empty() {
        return Err(ReconError::ConfigValidation(
            "header token list cannot be empty".into(),
        ));
    }

    let limit = search.max_rows.min(grid.height());
    // (row, hits) of the best candidate seen, for the error message
    let mut best: Option<(usize, usize)> = None;

    for row in 0..limit {
        let cells = row_labels(grid, row);
        let hits = match search.policy {
            HeaderPolicy::Strict => strict_hits(&cells, &wanted),
            HeaderPolicy::Fuzzy => fuzzy_hits(&cells, &wanted),
        };

        let accepted = match search.policy {
            HeaderPolicy::Strict => hits == wanted.len(),
            HeaderPolicy::Fuzzy => hits as f64 / wanted.len() as f64 >= search.min_ratio,
        };
        if accepted {
            log::debug!("sheet '{sheet}': header found in row {} ({hits}/{} tokens)", row + 1, wanted.len());
            return Ok(row);
        }

        if best.map_or(true, |(_, h)| hits > h) {
            best = Some((row, hits));
        }
    }

    let missing = match best {
        Some((row, _)) => {
            let cells = row_labels(grid, row);
            tokens
                .iter()
                .filter(|t| !token_present(&cells, &fold(t), search.policy))
                .cloned()
                .collect()
        }
        None => tokens.to_vec(),
    };

    Err(ReconError::HeaderNotFound {
        sheet: sheet.to_string(),
        missing,
        searched_rows: search.max_rows,
    })
}

fn fold(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Non-empty, trimmed, lower-cased labels of one row.
fn row_labels(grid: &RawGrid, row: usize) -> Vec<String> {
    grid.rows()
        .get(row)
        .map(|cells| {
            cells
                .iter()
                .map(|c| fold(&c.label()))
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn strict_hits(cells: &[String], wanted: &[String]) -> usize {
    let present: HashSet<&str> = cells.iter().map(String::as_str).collect();
    wanted.iter().filter(|w| present.contains(w.as_str())).count()
}

fn fuzzy_hits(cells: &[String], wanted: &[String]) -> usize {
    wanted
        .iter()
        .filter(|w| cells.iter().any(|c| c.contains(w.as_str())))
        .count()
}

fn token_present(cells: &[String], wanted: &str, policy: HeaderPolicy) -> bool {
    match policy {
        HeaderPolicy::Strict => cells.iter().any(|c| c == wanted),
        HeaderPolicy::Fuzzy => cells.iter().any(|c| c.contains(wanted)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Cell;

    fn grid(rows: &[&[&str]]) -> RawGrid {
        RawGrid::new(
            rows.iter()
                .map(|r| {
                    r.iter()
                        .map(|s| if s.is_empty() { Cell::Empty } else { Cell::text(*s) })
                        .collect()
                })
                .collect(),
        )
    }

    fn tokens(t: &[&str]) -> Vec<String> {
        t.iter().map(|s| s.to_string()).collect()
    }

    fn strict() -> HeaderSearch {
        HeaderSearch::default()
    }

    fn fuzzy() -> HeaderSearch {
        HeaderSearch {
            policy: HeaderPolicy::Fuzzy,
            ..HeaderSearch::default()
        }
    }

    #[test]
    fn strict_finds_row_below_title() {
        let g = grid(&[
            &["REPORTE DE SALIDAS", "", ""],
            &["", "", ""],
            &["Item", " numero contenedor ", "PLACA DE CARRETA", "HORA DE SALIDA"],
            &["1", "MRKU5466947", "T12345", "14:05"],
        ]);
        let row = locate_header(
            &g,
            "14",
            &tokens(&["NUMERO CONTENEDOR", "PLACA DE CARRETA", "HORA DE SALIDA"]),
            &strict(),
        )
        .unwrap();
        assert_eq!(row, 2);
    }

    #[test]
    fn strict_requires_full_cell_values() {
        let g = grid(&[&["NUMERO CONTENEDOR (ISO)", "PLACA DE CARRETA", "HORA DE SALIDA"]]);
        let err = locate_header(
            &g,
            "14",
            &tokens(&["NUMERO CONTENEDOR", "PLACA DE CARRETA", "HORA DE SALIDA"]),
            &strict(),
        )
        .unwrap_err();
        match err {
            ReconError::HeaderNotFound { sheet, missing, .. } => {
                assert_eq!(sheet, "14");
                assert_eq!(missing, vec!["NUMERO CONTENEDOR".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn fuzzy_accepts_partial_labels() {
        let g = grid(&[&["NUMERO CONTENEDOR (ISO)", "PLACA DE CARRETA", "OBS"]]);
        let row = locate_header(
            &g,
            "14",
            &tokens(&["NUMERO CONTENEDOR", "PLACA DE CARRETA", "HORA DE SALIDA"]),
            &fuzzy(),
        )
        .unwrap();
        assert_eq!(row, 0);
    }

    #[test]
    fn fuzzy_rejects_below_ratio() {
        let g = grid(&[&["NUMERO CONTENEDOR", "OBS", "OTRO"]]);
        let err = locate_header(
            &g,
            "14",
            &tokens(&["NUMERO CONTENEDOR", "PLACA DE CARRETA", "HORA DE SALIDA"]),
            &fuzzy(),
        );
        assert!(matches!(err, Err(ReconError::HeaderNotFound { .. })));
    }

    #[test]
    fn search_is_bounded() {
        let mut rows: Vec<Vec<Cell>> = (0..25).map(|_| vec![Cell::text("x")]).collect();
        rows.push(vec![Cell::text("Contenedor"), Cell::text("Placa 2")]);
        let g = RawGrid::new(rows);
        let err = locate_header(&g, "BBDD", &tokens(&["Contenedor", "Placa 2"]), &strict()).unwrap_err();
        match err {
            ReconError::HeaderNotFound { missing, searched_rows, .. } => {
                assert_eq!(searched_rows, 20);
                assert_eq!(missing.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_grid_reports_all_tokens() {
        let err = locate_header(&RawGrid::default(), "BBDD", &tokens(&["Fecha"]), &strict()).unwrap_err();
        assert!(err.to_string().contains("Fecha"));
    }

    #[test]
    fn empty_token_list_is_config_error() {
        let err = locate_header(&grid(&[&["a"]]), "s", &[], &strict());
        assert!(matches!(err, Err(ReconError::ConfigValidation(_))));
    }
}
