use chrono::NaiveDateTime;
use model::{
    records::row::Row,
    rules::{aggregation::SortOrder, latest::LatestSelection},
};

#[derive(Debug, Clone, Copy)]
pub struct Picked<'a> {
    pub row: &'a Row,
    /// False when no candidate carried a parseable time and the first row was used.
    pub timed: bool,
}

/// Time of `row`: the first configured field holding a parseable, non-blank date.
pub fn row_time(row: &Row, time_fields: &[String]) -> Option<NaiveDateTime> {
    time_fields.iter().find_map(|field| {
        row.value(field)
            .filter(|v| !v.is_blank())
            .and_then(|v| v.as_datetime())
    })
}

/// Newest (or oldest, for ascending order) row. Equal times keep the row
/// encountered first.
pub fn select_latest<'a>(rows: &[&'a Row], selection: &LatestSelection) -> Option<Picked<'a>> {
    let first = *rows.first()?;

    let mut best: Option<(&Row, NaiveDateTime)> = None;
    for &row in rows {
        let Some(at) = row_time(row, &selection.time_fields) else {
            continue;
        };
        let better = match best {
            None => true,
            Some((_, current)) => match selection.sort_order {
                SortOrder::Desc => at > current,
                SortOrder::Asc => at < current,
            },
        };
        if better {
            best = Some((row, at));
        }
    }

    Some(match best {
        Some((row, _)) => Picked { row, timed: true },
        None => Picked {
            row: first,
            timed: false,
        },
    })
}
