//! Excel生成（共通ライブラリ）
//!
//! 表をヘッダ行＋データ行の1シートとして書き出す

use crate::error::{Error, Result};
use rust_xlsxwriter::*;

const MIN_COL_WIDTH: f64 = 10.0;
const MAX_COL_WIDTH: f64 = 60.0;

/// シートに書き出す表データ
pub trait SheetData {
    /// ヘッダ（列名）
    fn headers(&self) -> Vec<String>;
    /// 行ごとのセル値（ヘッダと同じ並び）
    fn records(&self) -> Vec<Vec<String>>;
}

fn export_err(context: &str) -> impl Fn(XlsxError) -> Error + '_ {
    move |e| Error::Export(format!("{}: {}", context, e))
}

/// Excelをバッファに生成
///
/// # Arguments
/// * `data` - 表データ
/// * `sheet_name` - シート名
pub fn generate_excel_buffer<T: SheetData>(data: &T, sheet_name: &str) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();

    let header_format = Format::new()
        .set_bold()
        .set_font_size(10.0)
        .set_background_color(Color::RGB(0xF5F5F5))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_border(FormatBorder::Hair)
        .set_border_color(Color::RGB(0xAAAAAA));

    let value_format = Format::new()
        .set_font_size(11.0)
        .set_align(FormatAlign::Left)
        .set_align(FormatAlign::VerticalCenter)
        .set_text_wrap()
        .set_border(FormatBorder::Hair)
        .set_border_color(Color::RGB(0xCCCCCC));

    let headers = data.headers();
    let records = data.records();

    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(sheet_name)
        .map_err(export_err("シート名設定エラー"))?;

    for (col, header) in headers.iter().enumerate() {
        let col = col as u16;
        worksheet
            .write_string_with_format(0, col, header, &header_format)
            .map_err(export_err("ヘッダ書き込みエラー"))?;

        // 列幅は最長セルに合わせる
        let longest = records
            .iter()
            .filter_map(|r| r.get(col as usize))
            .map(|v| v.chars().count())
            .chain(std::iter::once(header.chars().count()))
            .max()
            .unwrap_or(0);
        let width = (longest as f64 + 2.0).clamp(MIN_COL_WIDTH, MAX_COL_WIDTH);
        worksheet
            .set_column_width(col, width)
            .map_err(export_err("列幅設定エラー"))?;
    }

    for (row, record) in records.iter().enumerate() {
        let row = row as u32 + 1;
        for (col, value) in record.iter().enumerate() {
            worksheet
                .write_string_with_format(row, col as u16, value, &value_format)
                .map_err(export_err("値書き込みエラー"))?;
        }
    }

    worksheet
        .set_freeze_panes(1, 0)
        .map_err(export_err("ウィンドウ枠固定エラー"))?;

    workbook
        .save_to_buffer()
        .map_err(export_err("Excel保存エラー"))
}
