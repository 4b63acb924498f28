//! Invoices
//!
//! Every placed order gets an invoice with a PDF rendering. The PDF is a
//! minimal PDF 1.4 document: Helvetica text lines, paginated, with a
//! correct cross-reference table.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{Order, User};

const LINES_PER_PAGE: usize = 50;
const MAX_NAME_LEN: usize = 60;

#[derive(Clone, Debug, Serialize)]
pub struct Invoice {
    pub id: Uuid,
    pub order_id: Uuid,
    pub number: String,
    pub issued_at: DateTime<Utc>,
    pub total: Decimal,
    #[serde(skip)]
    pub pdf: Vec<u8>,
}

/// Invoice without its document, for listings.
#[derive(Clone, Debug, Serialize)]
pub struct InvoiceSummary {
    pub id: Uuid,
    pub order_id: Uuid,
    pub number: String,
    pub issued_at: DateTime<Utc>,
    pub total: Decimal,
}

impl Invoice {
    pub fn generate(order: &Order, customer: &User, issued_at: DateTime<Utc>) -> Self {
        let number = invoice_number(order.id, order.created_at);
        let pdf = render_pdf(&invoice_lines(&number, order, customer, issued_at));
        Self { id: Uuid::now_v7(), order_id: order.id, number, issued_at, total: order.total_price, pdf }
    }

    pub fn summary(&self) -> InvoiceSummary {
        InvoiceSummary { id: self.id, order_id: self.order_id, number: self.number.clone(), issued_at: self.issued_at, total: self.total }
    }

    pub fn filename(&self) -> String { format!("{}.pdf", self.number) }
}

/// `INV-<yyyymmdd>-<last 8 hex digits of the order id>`, dated by the order
/// so a regenerated invoice keeps its number.
pub fn invoice_number(order_id: Uuid, placed_at: DateTime<Utc>) -> String {
    let hex = order_id.simple().to_string();
    format!("INV-{}-{}", placed_at.format("%Y%m%d"), hex[hex.len() - 8..].to_uppercase())
}

/// Plain-text body shared by the PDF and the confirmation email.
pub fn invoice_lines(number: &str, order: &Order, customer: &User, issued_at: DateTime<Utc>) -> Vec<String> {
    let mut lines = vec![
        format!("Invoice {number}"),
        format!("Issued: {}", issued_at.format("%Y-%m-%d %H:%M UTC")),
        format!("Order: {}", order.id),
        format!("Customer: {} <{}>", customer.display_name(), customer.email),
        format!("Deliver to: {}", order.delivery.address),
        String::new(),
    ];
    for item in &order.items {
        let mut name: String = item.product_name.chars().take(MAX_NAME_LEN).collect();
        if item.product_name.chars().count() > MAX_NAME_LEN { name.push_str("..."); }
        let discount = if item.discount.is_zero() { String::new() } else { format!(" ({}% off {:.2})", item.discount.percent().normalize(), item.unit_price) };
        lines.push(format!("{} x {name} @ {:.2}{discount} = {:.2}", item.quantity.value(), item.price_at_purchase, item.line_total()));
    }
    lines.push(String::new());
    lines.push(format!("Total: {:.2}", order.total_price));
    lines
}

pub fn render_pdf(lines: &[String]) -> Vec<u8> {
    let pages: Vec<&[String]> = if lines.is_empty() { vec![&[]] } else { lines.chunks(LINES_PER_PAGE).collect() };
    // 1 catalog, 2 page tree, 3 font, then a page and its content stream per page.
    let page_obj = |i: usize| 4 + i * 2;
    let kids: Vec<String> = (0..pages.len()).map(|i| format!("{} 0 R", page_obj(i))).collect();

    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), pages.len()),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    for (i, chunk) in pages.iter().enumerate() {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            page_obj(i) + 1
        ));
        let mut stream = String::from("BT\n/F1 11 Tf\n14 TL\n50 750 Td\n");
        for line in chunk.iter() {
            stream.push('(');
            stream.push_str(&escape_pdf_text(line));
            stream.push_str(") Tj T*\n");
        }
        stream.push_str("ET");
        objects.push(format!("<< /Length {} >>\nstream\n{stream}\nendstream", stream.len()));
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }
    let xref_at = out.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        xref.push_str(&format!("{offset:010} 00000 n \n"));
    }
    xref.push_str(&format!("trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n", objects.len() + 1));
    out.extend_from_slice(xref.as_bytes());
    out
}

/// Escapes a string literal for a content stream. Non-ASCII characters are
/// not representable in the base font and become `?`.
fn escape_pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '(' | ')' => { out.push('\\'); out.push(c); }
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}
