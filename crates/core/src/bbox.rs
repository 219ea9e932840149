//! # バウンディングボックス応答の解析
//!
//! 画像認識サービスは「左上x 左上y 右下x 右下y」を空白区切りのテキストで返す。
//! 応答は信用せず、形式が合わない場合は全て番兵値 `(0, 0, 0, 0)` に落とす。

use imagelink_types::BoundingBox;

/// 応答テキストをバウンディングボックスに変換する。
///
/// ちょうど4つの数値トークンでなければ `BoundingBox::NOT_FOUND` を返す。
/// 数値トークンは数字と高々1つの `.` からなるもの（符号・指数表記・inf/nanは不可）。
pub fn parse_bounding_box(raw: &str) -> BoundingBox {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    if parts.len() != 4 || !parts.iter().all(|p| is_plain_decimal(p)) {
        return BoundingBox::NOT_FOUND;
    }

    let mut coords = [0.0; 4];
    for (slot, part) in coords.iter_mut().zip(&parts) {
        match part.parse::<f64>() {
            Ok(v) => *slot = v,
            Err(_) => return BoundingBox::NOT_FOUND,
        }
    }
    BoundingBox(coords)
}

fn is_plain_decimal(token: &str) -> bool {
    let mut dots = 0;
    let mut digits = 0;
    for b in token.bytes() {
        match b {
            b'0'..=b'9' => digits += 1,
            b'.' => dots += 1,
            _ => return false,
        }
    }
    digits > 0 && dots <= 1
}
