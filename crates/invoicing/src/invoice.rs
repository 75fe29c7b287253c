use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use classwms_core::{text, DomainError, DomainResult, InvoiceId, ProductId};

/// Kind of commercial document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    #[default]
    Invoice,
    DeliveryNote,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Invoice => "invoice",
            DocType::DeliveryNote => "delivery_note",
        }
    }
}

impl core::fmt::Display for DocType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for DocType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invoice" => Ok(DocType::Invoice),
            "delivery_note" => Ok(DocType::DeliveryNote),
            other => Err(DomainError::validation(format!("invalid document type: {other}"))),
        }
    }
}

/// Header fields submitted with a new document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentHeader {
    pub doc_number: String,
    pub doc_type: DocType,
    /// Defaults to the commit day when absent.
    pub doc_date: Option<NaiveDate>,
    pub customer_name: String,
    pub tax_id: Option<String>,
    pub address: Option<String>,
}

impl DocumentHeader {
    pub fn new(doc_number: impl Into<String>, customer_name: impl Into<String>) -> Self {
        Self {
            doc_number: doc_number.into(),
            customer_name: customer_name.into(),
            ..Self::default()
        }
    }

    pub fn dated(mut self, doc_date: NaiveDate) -> Self {
        self.doc_date = Some(doc_date);
        self
    }

    pub fn of_type(mut self, doc_type: DocType) -> Self {
        self.doc_type = doc_type;
        self
    }
}

/// One requested line: take `quantity` units of `product_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

impl LineRequest {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// A document request that passed validation and is ready to reserve stock.
///
/// Invariants: header text fields are trimmed and non-empty where required,
/// `doc_date` is resolved, and every line has a positive quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRequest {
    header: DocumentHeader,
    doc_date: NaiveDate,
    lines: Vec<LineRequest>,
}

impl DocumentRequest {
    /// Validate a raw request.
    ///
    /// Lines with a non-positive quantity are dropped; if none remain the
    /// request is rejected with `EmptyLines`.
    pub fn validate(
        header: DocumentHeader,
        lines: Vec<LineRequest>,
        today: NaiveDate,
    ) -> DomainResult<Self> {
        let doc_number = text::optional(Some(&header.doc_number))
            .ok_or_else(|| DomainError::invalid_header("document number cannot be empty"))?;
        let customer_name = text::optional(Some(&header.customer_name))
            .ok_or_else(|| DomainError::invalid_header("customer name cannot be empty"))?;

        let lines: Vec<LineRequest> = lines.into_iter().filter(|l| l.quantity > 0).collect();
        if lines.is_empty() {
            return Err(DomainError::EmptyLines);
        }

        let doc_date = header.doc_date.unwrap_or(today);
        Ok(Self {
            header: DocumentHeader {
                doc_number,
                doc_type: header.doc_type,
                doc_date: Some(doc_date),
                customer_name,
                tax_id: text::optional(header.tax_id.as_deref()),
                address: text::optional(header.address.as_deref()),
            },
            doc_date,
            lines,
        })
    }

    pub fn header(&self) -> &DocumentHeader {
        &self.header
    }

    pub fn doc_date(&self) -> NaiveDate {
        self.doc_date
    }

    pub fn lines(&self) -> &[LineRequest] {
        &self.lines
    }

    /// Sum of requested units across all lines.
    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

/// A committed document header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDocument {
    pub id: InvoiceId,
    pub doc_number: String,
    pub doc_type: DocType,
    pub doc_date: NaiveDate,
    pub customer_name: String,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A committed line, resolved against the current product name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i64,
}

/// Listing row for committed documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub id: InvoiceId,
    pub doc_number: String,
    pub doc_type: DocType,
    pub doc_date: NaiveDate,
    pub customer_name: String,
    pub line_count: i64,
    pub total_quantity: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn pen() -> ProductId {
        ProductId::new(1)
    }

    #[test]
    fn valid_request_resolves_date_and_trims_header() {
        let header = DocumentHeader {
            tax_id: Some("  ".to_string()),
            ..DocumentHeader::new(" INV-1 ", " Acme ")
        };
        let req = DocumentRequest::validate(header, vec![LineRequest::new(pen(), 4)], today())
            .unwrap();

        assert_eq!(req.header().doc_number, "INV-1");
        assert_eq!(req.header().customer_name, "Acme");
        assert_eq!(req.header().tax_id, None);
        assert_eq!(req.doc_date(), today());
        assert_eq!(req.lines(), &[LineRequest::new(pen(), 4)]);
    }

    #[test]
    fn explicit_doc_date_is_kept() {
        let date = NaiveDate::from_ymd_opt(2023, 12, 24).unwrap();
        let req = DocumentRequest::validate(
            DocumentHeader::new("DN-9", "Acme").dated(date).of_type(DocType::DeliveryNote),
            vec![LineRequest::new(pen(), 1)],
            today(),
        )
        .unwrap();
        assert_eq!(req.doc_date(), date);
        assert_eq!(req.header().doc_type, DocType::DeliveryNote);
    }

    #[test]
    fn missing_doc_number_is_invalid_header() {
        let err = DocumentRequest::validate(
            DocumentHeader::new("  ", "Acme"),
            vec![LineRequest::new(pen(), 1)],
            today(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidHeader(_)));
    }

    #[test]
    fn missing_customer_is_invalid_header() {
        let err = DocumentRequest::validate(
            DocumentHeader::new("INV-1", ""),
            vec![LineRequest::new(pen(), 1)],
            today(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidHeader(_)));
    }

    #[test]
    fn header_is_checked_before_lines() {
        let err = DocumentRequest::validate(DocumentHeader::default(), vec![], today()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidHeader(_)));
    }

    #[test]
    fn no_lines_is_empty_lines() {
        let err = DocumentRequest::validate(DocumentHeader::new("INV-1", "Acme"), vec![], today())
            .unwrap_err();
        assert_eq!(err, DomainError::EmptyLines);
    }

    #[test]
    fn all_non_positive_lines_is_empty_lines() {
        let err = DocumentRequest::validate(
            DocumentHeader::new("INV-1", "Acme"),
            vec![LineRequest::new(pen(), 0), LineRequest::new(ProductId::new(2), -3)],
            today(),
        )
        .unwrap_err();
        assert_eq!(err, DomainError::EmptyLines);
    }

    #[test]
    fn non_positive_lines_are_dropped_when_others_remain() {
        let req = DocumentRequest::validate(
            DocumentHeader::new("INV-1", "Acme"),
            vec![LineRequest::new(pen(), 0), LineRequest::new(ProductId::new(2), 5)],
            today(),
        )
        .unwrap();
        assert_eq!(req.lines(), &[LineRequest::new(ProductId::new(2), 5)]);
        assert_eq!(req.total_quantity(), 5);
    }

    #[test]
    fn doc_type_round_trips_through_its_storage_name() {
        for doc_type in [DocType::Invoice, DocType::DeliveryNote] {
            assert_eq!(doc_type.as_str().parse::<DocType>().unwrap(), doc_type);
        }
        assert!("receipt".parse::<DocType>().is_err());
    }

    proptest! {
        #[test]
        fn validated_lines_are_exactly_the_positive_ones(
            quantities in proptest::collection::vec(-5i64..20, 0..12)
        ) {
            let lines: Vec<LineRequest> = quantities
                .iter()
                .enumerate()
                .map(|(i, q)| LineRequest::new(ProductId::new(i as i64), *q))
                .collect();
            let positive: Vec<LineRequest> =
                lines.iter().copied().filter(|l| l.quantity > 0).collect();

            match DocumentRequest::validate(DocumentHeader::new("INV", "C"), lines, today()) {
                Ok(req) => prop_assert_eq!(req.lines(), positive.as_slice()),
                Err(DomainError::EmptyLines) => prop_assert!(positive.is_empty()),
                Err(other) => prop_assert!(false, "unexpected error {other:?}"),
            }
        }
    }
}
