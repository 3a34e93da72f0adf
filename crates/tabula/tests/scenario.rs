#![forbid(unsafe_code)]

//! End-to-end walk through a task board using only the facade.

use serde_json::{Value, json};
use tabula::prelude::*;
use tabula::{CellValue, RowKind};

fn board() -> tabula::Result<Table<Value>> {
    let registry = ColumnRegistry::new(vec![
        ColumnDescriptor::field("id").header("ID"),
        ColumnDescriptor::field("title").header("Title"),
        ColumnDescriptor::field("status"),
        ColumnDescriptor::field("points"),
    ])?;
    let statuses = ["todo", "doing", "done"];
    let records = (0..25)
        .map(|i| {
            json!({
                "id": i,
                "title": format!("task {i}"),
                "status": statuses[i % 3],
                "points": i % 5,
            })
        })
        .collect();
    Ok(Table::builder(registry)
        .records(records)
        .config(TableConfig::default().page_size(10).estimate_size(20))
        .build())
}

#[test]
fn paginate_sort_filter_select_export() -> tabula::Result<()> {
    let mut table = board()?;
    assert_eq!(table.model().page_count(), 3);
    assert_eq!(table.model().page_len(), 10);

    let sort = Intent::ToggleSort {
        column: "points".into(),
        multi: false,
    };
    table.dispatch(sort.clone());
    table.dispatch(sort);
    let model = table.model();
    let first = model.rows().next().map(|row| model.cell(row, 3).clone());
    assert_eq!(first, Some(CellValue::Int(4)));

    table.dispatch(Intent::SetPage(2));
    table.dispatch(Intent::SetColumnFilter {
        column: "status".into(),
        value: Some(FilterValue::from("todo")),
    });
    assert_eq!(table.state().pagination.page_index, 0);
    assert_eq!(table.model().filtered_leaf_count(), 9);

    table.dispatch(Intent::SelectAll {
        scope: SelectAllScope::Filtered,
        selected: true,
    });
    assert!(table.is_all_selected(SelectAllScope::Filtered));
    assert_eq!(table.selected_count(SelectAllScope::Filtered), 9);

    let csv = table.export(&DelimitedTextSink::csv())?;
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("ID,Title,status,points"));
    assert_eq!(lines.count(), 9);
    Ok(())
}

#[test]
fn grouping_and_expansion() -> tabula::Result<()> {
    let mut table = board()?;
    table.dispatch(Intent::SetGrouping(vec!["status".into()]));

    let groups: Vec<(String, usize)> = table
        .model()
        .rows()
        .filter_map(|row| match &row.kind {
            RowKind::Group(group) => Some((row.id.clone(), group.leaf_count)),
            RowKind::Leaf { .. } => None,
        })
        .collect();
    assert_eq!(
        groups,
        vec![
            ("status:todo".to_string(), 9),
            ("status:doing".to_string(), 8),
            ("status:done".to_string(), 8),
        ]
    );
    assert_eq!(table.model().row_count(), 3);

    table.dispatch(Intent::ToggleExpanded("status:todo".into()));
    assert_eq!(table.model().row_count(), 12);
    assert_eq!(table.model().page_len(), 10);

    table.dispatch(Intent::ToggleRowSelected("status:todo".into()));
    assert!(!table.is_row_selected("status:todo"));
    Ok(())
}

#[test]
fn window_follows_current_page() -> tabula::Result<()> {
    let mut table = board()?;
    let window = table.window(100, 0);
    assert_eq!(window.total, 200);
    assert_eq!(window.range.start, 0);
    assert!(window.range.end >= 5);

    table.measure_row(0, 60);
    let offset = table.scroll_offset_for(9, Align::End, 100, 0);
    assert_eq!(offset, 240 - 100);
    Ok(())
}
