use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sheet_splitter::merge;
use sheet_splitter::partition;
use sheet_splitter::split;
use sheet_splitter::split_workbook;
use sheet_splitter::ReadOptions;
use sheet_splitter::SplitOptions;
use sheet_splitter::SplitterError;
use sheet_splitter::Table;
use sheet_splitter::Value;
use sheet_splitter::Workbook;
use std::io::Cursor;
use std::io::Read;
use zip::ZipArchive;

fn orders(quantities: &[f64]) -> Table {
    let records = quantities
        .iter()
        .enumerate()
        .map(|(index, quantity)| {
            vec![
                Value::from(format!("零件{index}")),
                Value::from(*quantity),
                Value::from("仓库A"),
            ]
        })
        .collect();
    Table::from_records(["名称", "数量", "仓库"], "数量", records).unwrap()
}

fn quantities(table: &Table) -> Vec<Option<f64>> {
    table.quantities().collect()
}

fn unzip(archive: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut zip = ZipArchive::new(Cursor::new(archive)).unwrap();
    (0..zip.len())
        .map(|index| {
            let mut file = zip.by_index(index).unwrap();
            let mut content = Vec::new();
            file.read_to_end(&mut content).unwrap();
            (file.name().to_owned(), content)
        })
        .collect()
}

/// Integer quantities, so sums compare exactly; ones are frequent to form runs.
fn quantity_list() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(prop_oneof![3 => Just(1.0), 2 => (0u32..800).prop_map(f64::from)], 0..60)
}

proptest! {
    #[test]
    fn merge_is_idempotent(list in quantity_list()) {
        let merged = merge(&orders(&list));
        prop_assert_eq!(merge(&merged), merged);
    }

    #[test]
    fn merge_leaves_no_adjacent_ones(list in quantity_list()) {
        let merged = merge(&orders(&list));
        let merged = quantities(&merged);
        prop_assert!(merged.len() <= list.len());
        prop_assert!(merged.windows(2).all(|pair| pair != [Some(1.0), Some(1.0)]));
    }

    #[test]
    fn partition_preserves_rows_and_order(list in quantity_list(), limit in 1u32..1000) {
        let table = orders(&list);
        let groups = partition(&table, f64::from(limit));

        let rows: Vec<_> = groups.iter().flat_map(|group| group.rows().to_vec()).collect();
        prop_assert_eq!(rows.as_slice(), table.rows());
        let total: f64 = groups.iter().map(Table::quantity_sum).sum();
        prop_assert_eq!(total, table.quantity_sum());
        prop_assert!(groups.iter().all(|group| !group.is_empty()));
    }

    #[test]
    fn groups_stay_under_limit(list in quantity_list(), limit in 1u32..1000) {
        let limit = f64::from(limit);
        for group in partition(&orders(&list), limit) {
            prop_assert!(group.quantity_sum() <= limit || group.len() == 1);
        }
    }
}

#[test]
fn scenario() {
    let table = orders(&[1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 590.0, 2.0]);
    let merged = merge(&table);
    assert_eq!(
        quantities(&merged),
        vec![Some(1.0), Some(5.0), Some(1.0), Some(590.0), Some(2.0)]
    );
    let sums: Vec<f64> = partition(&merged, 590.0).iter().map(Table::quantity_sum).collect();
    assert_eq!(sums, vec![7.0, 590.0, 2.0]);
}

#[test]
fn merged_row_keeps_only_the_quantity() {
    let merged = merge(&orders(&[1.0, 1.0]));
    assert_eq!(merged.len(), 1);
    assert_eq!(
        merged.rows()[0].values(),
        &[Value::Empty, Value::from(1.0), Value::Empty]
    );
}

#[test]
fn all_ones() {
    let result = split(&orders(&[1.0; 5]), &SplitOptions::new(3.0, "数量")).unwrap();
    assert_eq!(result.merged.len(), 1);
    assert_eq!(result.groups.len(), 1);
    assert_eq!(unzip(&result.archive).len(), 1);
}

#[test]
fn empty_input() {
    let result = split(&orders(&[]), &SplitOptions::default()).unwrap();
    assert!(result.merged.is_empty());
    assert!(result.groups.is_empty());
    assert!(unzip(&result.archive).is_empty());
}

#[test]
fn workbook_to_archive() {
    let mut source = rust_xlsxwriter::Workbook::new();
    let worksheet = source.add_worksheet();
    worksheet.set_name("订单").unwrap();
    for (col, header) in ["名称", "数量", "备注"].into_iter().enumerate() {
        worksheet.write_string(0, col as u16, header).unwrap();
    }
    let quantities = [1.0, 1.0, 300.0, 200.0, 1.0, 150.0];
    for (offset, quantity) in quantities.into_iter().enumerate() {
        let row = offset as u32 + 1;
        worksheet.write_string(row, 0, format!("零件{row}")).unwrap();
        worksheet.write_number(row, 1, quantity).unwrap();
    }
    worksheet.write_string(3, 2, "加急").unwrap();

    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("订单.xlsx");
    source.save(&path).unwrap();

    let mut workbook = Workbook::open(&path).unwrap();
    let options = SplitOptions::new(500.0, "数量");
    let result = split_workbook(&mut workbook, &ReadOptions::default(), &options).unwrap();
    assert_eq!(result.input.rows, 6);
    assert_eq!(result.merged.len(), 5);

    let entries = unzip(&result.archive);
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["Sheet1.xls", "Sheet2.xls"]);

    let groups: Vec<Table> = entries
        .into_iter()
        .map(|(name, content)| {
            let mut workbook = Workbook::from_bytes(&name, content).unwrap();
            let sheet = workbook.read_sheet(&ReadOptions::default()).unwrap();
            sheet.to_table("数量").unwrap()
        })
        .collect();
    assert_eq!(groups[0].schema().columns(), &["名称", "数量", "备注"]);
    assert_eq!(
        groups[0].rows()[1].values(),
        &[Value::from("零件3"), Value::from(300.0), Value::from("加急")]
    );
    assert_eq!(
        groups[1].rows()[0].values(),
        &[Value::from("零件4"), Value::from(200.0), Value::Empty]
    );
    assert_eq!(
        quantities_of(&groups),
        vec![vec![Some(1.0), Some(300.0)], vec![Some(200.0), Some(1.0), Some(150.0)]]
    );
}

fn quantities_of(groups: &[Table]) -> Vec<Vec<Option<f64>>> {
    groups.iter().map(quantities).collect()
}

#[test]
fn missing_quantity_column() {
    let mut source = rust_xlsxwriter::Workbook::new();
    let worksheet = source.add_worksheet();
    worksheet.write_string(0, 0, "名称").unwrap();
    worksheet.write_string(1, 0, "螺丝").unwrap();
    let bytes = source.save_to_buffer().unwrap();

    let mut workbook = Workbook::from_bytes("orders.xlsx", bytes).unwrap();
    let error = split_workbook(&mut workbook, &ReadOptions::default(), &SplitOptions::default())
        .unwrap_err();
    assert!(matches!(error, SplitterError::SchemaError(_)));
}
