use chrono::NaiveDate;
use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{
    api::DeviceInfo,
    quantity::energy::KilowattHours,
    statistics::{DayRecord, EnergyTotals, Field},
};

const HEADER: [&str; 7] = ["Period", "PV", "Grid", "Load", "Essential", "Charge", "Discharge"];

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table
}

fn energy_cell(value: KilowattHours) -> Cell {
    let cell = Cell::new(value).set_alignment(CellAlignment::Right);
    if value.is_negligible() { cell.add_attribute(Attribute::Dim) } else { cell }
}

fn totals_row(label: impl ToString, totals: &EnergyTotals) -> Vec<Cell> {
    let mut row = vec![Cell::new(label.to_string())];
    row.extend(Field::ALL.into_iter().map(|field| energy_cell(totals[field])));
    row
}

/// One row per labelled period.
pub fn build_totals_table<L: ToString>(rows: impl IntoIterator<Item = (L, EnergyTotals)>) -> Table {
    let mut table = new_table();
    table.set_header(HEADER);
    for (label, totals) in rows {
        table.add_row(totals_row(label, &totals));
    }
    table
}

/// One row per day of the month, unknown days included.
pub fn build_month_series_table(
    series: &[(NaiveDate, Option<DayRecord>)],
    total: &EnergyTotals,
) -> Table {
    let mut table = new_table();
    table.set_header(HEADER);
    for (date, record) in series {
        let label = date.format("%b %d");
        match record {
            Some(record) => {
                table.add_row(totals_row(label, record));
            }
            None => {
                let mut row = vec![Cell::new(label).add_attribute(Attribute::Dim)];
                row.extend(Field::ALL.map(|_| {
                    Cell::new("–").set_alignment(CellAlignment::Right).fg(Color::DarkGrey)
                }));
                table.add_row(row);
            }
        }
    }
    table.add_row(
        totals_row("Total", total).into_iter().map(|cell| cell.add_attribute(Attribute::Bold)),
    );
    table
}

pub fn build_device_info_table(device_info: &DeviceInfo) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Attribute", "Value"]);
    for key in device_info.0.keys() {
        let value = device_info.get(key);
        let value_cell = match &value {
            Some(value) => Cell::new(value),
            None => Cell::new("null").add_attribute(Attribute::Dim),
        };
        table.add_row(vec![Cell::new(key).add_attribute(Attribute::Dim), value_cell]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_series_table_marks_unknown_days() {
        let on = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let record = DayRecord { pv: KilowattHours(5.0), ..Default::default() };
        let series = [(on, Some(record)), (on.succ_opt().unwrap(), None)];
        let rendered = build_month_series_table(&series, &record).to_string();
        assert!(rendered.contains("Mar 01"));
        assert!(rendered.contains("Mar 02"));
        assert!(rendered.contains('–'));
        assert!(rendered.contains("5.000 kWh"));
    }
}
