//! Printable prescription artifacts: QR code (SVG) and a one-page PDF.
//!
//! Both are rendered on request from the stored prescription; nothing is
//! written to disk.

use std::io::BufWriter;

use printpdf::{BuiltinFont, Mm, PdfDocument};

use crate::db::{fmt_date, fmt_datetime};
use crate::models::Prescription;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("QR generation failed: {0}")]
    Qr(String),
    #[error("PDF generation failed: {0}")]
    Pdf(String),
}

/// Link a pharmacist scans to look the prescription up.
pub fn prescription_link(frontend_url: &str, rx: &Prescription) -> String {
    format!("{frontend_url}/prescriptions/{}", rx.id)
}

pub fn generate_qr_svg(payload: &str) -> Result<String, DocumentError> {
    use qrcode::render::svg;
    use qrcode::QrCode;

    let code = QrCode::new(payload.as_bytes()).map_err(|e| DocumentError::Qr(e.to_string()))?;

    Ok(code
        .render::<svg::Color>()
        .min_dimensions(200, 200)
        .max_dimensions(300, 300)
        .dark_color(svg::Color("#1c1917"))
        .light_color(svg::Color("#ffffff"))
        .quiet_zone(true)
        .build())
}

/// Names resolved by the caller; the prescription row only holds ids.
pub struct PrescriptionSheet<'a> {
    pub prescription: &'a Prescription,
    pub patient_name: &'a str,
    pub doctor_name: &'a str,
}

/// Generates the prescription PDF. Returns PDF bytes.
pub fn generate_prescription_pdf(sheet: &PrescriptionSheet<'_>) -> Result<Vec<u8>, DocumentError> {
    let rx = sheet.prescription;
    let title = "Kiangombe Health - Prescription";
    let (doc, page1, layer1) = PdfDocument::new(title, Mm(210.0), Mm(297.0), "Layer 1");
    let layer = doc.get_page(page1).get_layer(layer1);
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| DocumentError::Pdf(format!("font: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| DocumentError::Pdf(format!("font: {e}")))?;

    let mut y = Mm(280.0);
    layer.use_text(title, 14.0, Mm(20.0), y, &bold);
    y -= Mm(10.0);

    let header = [
        format!("Prescription: {}", rx.id),
        format!("Patient: {}", sheet.patient_name),
        format!("Prescribed by: {}", sheet.doctor_name),
        format!("Issued: {}", fmt_datetime(&rx.issued_date)),
        format!(
            "Expires: {}",
            rx.expiry_date.map(|d| fmt_date(&d)).unwrap_or_else(|| "-".into())
        ),
        format!("Pharmacy: {}", rx.pharmacy_name.as_deref().unwrap_or("-")),
        format!("Status: {}", rx.status),
    ];
    for line in &header {
        layer.use_text(line, 9.0, Mm(20.0), y, &font);
        y -= Mm(5.0);
    }

    y -= Mm(4.0);
    layer.use_text("MEDICATIONS:", 11.0, Mm(20.0), y, &bold);
    y -= Mm(6.0);
    for (i, med) in rx.medications.iter().enumerate() {
        let mut text = format!("{}. {} {}, {}", i + 1, med.name, med.dosage, med.frequency);
        if let Some(duration) = &med.duration {
            text.push_str(&format!(", for {duration}"));
        }
        for line in wrap_text(&text, 80) {
            layer.use_text(&line, 9.0, Mm(25.0), y, &font);
            y -= Mm(4.5);
        }
        if let Some(instructions) = &med.instructions {
            for line in wrap_text(instructions, 76) {
                layer.use_text(&line, 8.0, Mm(30.0), y, &font);
                y -= Mm(4.0);
            }
        }
        y -= Mm(2.0);
        // single page; drop what would run off the bottom margin
        if y < Mm(20.0) {
            break;
        }
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| DocumentError::Pdf(format!("save: {e}")))?;
    buf.into_inner()
        .map_err(|e| DocumentError::Pdf(format!("buffer: {e}")))
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
