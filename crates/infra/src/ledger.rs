//! Invoice ledger: commits documents against stock.
//!
//! ## Atomicity
//!
//! `create_document` validates the request without touching the store, then
//! runs the header insert, every stock reservation and every line insert in
//! one write transaction. The first failing line aborts the transaction, so a
//! rejected document leaves no header, no lines and no stock change behind.
//!
//! Lines are reserved in request order. Several lines for the same product
//! each draw from the already-reduced stock.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, info, instrument, warn};

use classwms_core::{DomainError, InvoiceId, ProductId};
use classwms_invoicing::{
    CommitAttempt, CommitState, DocumentHeader, DocumentLine, DocumentRequest, InvoiceDocument,
    InvoiceSummary, LineRequest,
};

use crate::catalog::adjust_quantity_in;
use crate::error::{map_sqlx_error, StoreError, StoreResult};
use crate::store::StoreHandle;

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: i64,
    doc_number: String,
    doc_type: String,
    doc_date: NaiveDate,
    customer_name: String,
    tax_id: Option<String>,
    address: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for InvoiceDocument {
    type Error = DomainError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(InvoiceDocument {
            id: InvoiceId::new(row.id),
            doc_number: row.doc_number,
            doc_type: row.doc_type.parse()?,
            doc_date: row.doc_date,
            customer_name: row.customer_name,
            tax_id: row.tax_id,
            address: row.address,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    product_id: i64,
    product_name: String,
    quantity: i64,
}

impl From<LineRow> for DocumentLine {
    fn from(row: LineRow) -> Self {
        DocumentLine {
            product_id: ProductId::new(row.product_id),
            product_name: row.product_name,
            quantity: row.quantity,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    id: i64,
    doc_number: String,
    doc_type: String,
    doc_date: NaiveDate,
    customer_name: String,
    line_count: i64,
    total_quantity: i64,
}

impl TryFrom<SummaryRow> for InvoiceSummary {
    type Error = DomainError;

    fn try_from(row: SummaryRow) -> Result<Self, Self::Error> {
        Ok(InvoiceSummary {
            id: InvoiceId::new(row.id),
            doc_number: row.doc_number,
            doc_type: row.doc_type.parse()?,
            doc_date: row.doc_date,
            customer_name: row.customer_name,
            line_count: row.line_count,
            total_quantity: row.total_quantity,
        })
    }
}

/// Committed invoices and delivery notes of one store.
#[derive(Debug, Clone)]
pub struct InvoiceLedger {
    store: StoreHandle,
}

impl InvoiceLedger {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Commit a document and take its quantities out of stock.
    ///
    /// Errors: `InvalidHeader` / `EmptyLines` before anything is written;
    /// `UnknownProduct` / `InsufficientStock` for the first line that cannot
    /// be reserved, after which the whole document is rolled back.
    #[instrument(
        skip(self, header, lines),
        fields(tenant = %self.store.tenant_id(), doc_number = %header.doc_number),
        err
    )]
    pub async fn create_document(
        &self,
        header: DocumentHeader,
        lines: Vec<LineRequest>,
    ) -> StoreResult<InvoiceId> {
        let mut attempt = CommitAttempt::start();

        let request = match DocumentRequest::validate(header, lines, Utc::now().date_naive()) {
            Ok(request) => request,
            Err(err) => {
                transition(&mut attempt, CommitState::Rejected);
                return Err(err.into());
            }
        };

        transition(&mut attempt, CommitState::Reserving);
        let result: StoreResult<InvoiceId> = async {
            let mut txn = self.store.write().await?;
            let id = insert_document(txn.conn(), &request).await?;
            txn.commit().await?;
            Ok(id)
        }
        .await;

        match result {
            Ok(id) => {
                transition(&mut attempt, CommitState::Committed);
                info!(
                    invoice_id = %id,
                    lines = request.lines().len(),
                    total_quantity = request.total_quantity(),
                    "document committed"
                );
                Ok(id)
            }
            Err(err) => {
                if let Some(product_id) = err.as_domain().and_then(DomainError::product_id) {
                    warn!(product_id = %product_id, "document line could not be reserved: {err}");
                }
                transition(&mut attempt, CommitState::RolledBack);
                Err(err)
            }
        }
    }

    /// A committed document with its lines in entry order.
    #[instrument(skip(self), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn get_document(
        &self,
        id: InvoiceId,
    ) -> StoreResult<(InvoiceDocument, Vec<DocumentLine>)> {
        // One read transaction so header and lines come from the same snapshot.
        let mut tx = self
            .store
            .pool()
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_read", e))?;

        let row: Option<InvoiceRow> = sqlx::query_as(
            r#"
            SELECT id, doc_number, doc_type, doc_date, customer_name, tax_id, address, created_at
            FROM invoices
            WHERE id = ?1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("get_invoice", e))?;
        let row = row.ok_or_else(|| DomainError::not_found(format!("document {id}")))?;

        let lines: Vec<LineRow> = sqlx::query_as(
            r#"
            SELECT l.product_id, p.name AS product_name, l.quantity
            FROM invoice_lines l
            JOIN products p ON p.id = l.product_id
            WHERE l.invoice_id = ?1
            ORDER BY l.id ASC
            "#,
        )
        .bind(id.get())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("get_invoice_lines", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("end_read", e))?;

        let document = InvoiceDocument::try_from(row)?;
        Ok((document, lines.into_iter().map(DocumentLine::from).collect()))
    }

    /// Summaries of all documents, newest document date first.
    #[instrument(skip(self), fields(tenant = %self.store.tenant_id()), err)]
    pub async fn list_documents(&self) -> StoreResult<Vec<InvoiceSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            r#"
            SELECT i.id, i.doc_number, i.doc_type, i.doc_date, i.customer_name,
                   COUNT(l.id) AS line_count,
                   COALESCE(SUM(l.quantity), 0) AS total_quantity
            FROM invoices i
            LEFT JOIN invoice_lines l ON l.invoice_id = i.id
            GROUP BY i.id
            ORDER BY i.doc_date DESC, i.id DESC
            "#,
        )
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| map_sqlx_error("list_invoices", e))?;

        rows.into_iter()
            .map(|row| InvoiceSummary::try_from(row).map_err(StoreError::from))
            .collect()
    }
}

fn transition(attempt: &mut CommitAttempt, next: CommitState) {
    match attempt.advance(next) {
        Some(previous) if next.is_terminal() => {
            info!(from = %previous, to = %next, "document commit finished")
        }
        Some(previous) => debug!(from = %previous, to = %next, "document commit state"),
        None => warn!(from = %attempt.state(), to = %next, "illegal document commit transition"),
    }
}

async fn insert_document(
    conn: &mut SqliteConnection,
    request: &DocumentRequest,
) -> StoreResult<InvoiceId> {
    let header = request.header();
    let result = sqlx::query(
        r#"
        INSERT INTO invoices (doc_number, doc_type, doc_date, customer_name, tax_id, address, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&header.doc_number)
    .bind(header.doc_type.as_str())
    .bind(request.doc_date())
    .bind(&header.customer_name)
    .bind(&header.tax_id)
    .bind(&header.address)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_invoice", e))?;
    let invoice_id = InvoiceId::new(result.last_insert_rowid());

    for line in request.lines() {
        reserve(&mut *conn, line).await?;

        sqlx::query(
            r#"
            INSERT INTO invoice_lines (invoice_id, product_id, quantity)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(invoice_id.get())
        .bind(line.product_id.get())
        .bind(line.quantity)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert_invoice_line", e))?;
    }

    Ok(invoice_id)
}

/// Take one line's quantity out of stock, reporting failures per product.
async fn reserve(conn: &mut SqliteConnection, line: &LineRequest) -> StoreResult<i64> {
    let product_id = line.product_id;
    adjust_quantity_in(conn, product_id, -line.quantity)
        .await
        .map_err(|err| match err {
            StoreError::Domain(DomainError::NotFound(_)) => {
                DomainError::UnknownProduct { product_id }.into()
            }
            StoreError::Domain(DomainError::NegativeStock { .. }) => {
                DomainError::InsufficientStock { product_id }.into()
            }
            other => other,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestStores;
    use classwms_invoicing::DocType;
    use classwms_inventory::NewProduct;
    use proptest::prelude::*;

    async fn count(store: &StoreHandle, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    async fn stocked(store: &StoreHandle, name: &str, quantity: i64) -> ProductId {
        store
            .products()
            .create(NewProduct::named(name).with_quantity(quantity))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn committed_document_reduces_stock_and_reads_back() {
        let stores = TestStores::new().await;
        let store = stores.tenant("m2023001").await;
        let pen = stocked(&store, "Pen", 10).await;
        let ledger = store.ledger();

        let id = ledger
            .create_document(DocumentHeader::new("INV-1", "Acme"), vec![LineRequest::new(pen, 4)])
            .await
            .unwrap();
        assert_eq!(store.products().get(pen).await.unwrap().quantity, 6);

        let (document, lines) = ledger.get_document(id).await.unwrap();
        assert_eq!(document.doc_number, "INV-1");
        assert_eq!(document.customer_name, "Acme");
        assert_eq!(document.doc_type, DocType::Invoice);
        assert_eq!(document.doc_date, Utc::now().date_naive());
        assert_eq!(
            lines,
            vec![DocumentLine {
                product_id: pen,
                product_name: "Pen".to_string(),
                quantity: 4,
            }]
        );

        let err = ledger
            .create_document(DocumentHeader::new("INV-2", "Acme"), vec![LineRequest::new(pen, 10)])
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(DomainError::InsufficientStock { product_id }) if *product_id == pen
        ));
        assert_eq!(store.products().get(pen).await.unwrap().quantity, 6);
        assert_eq!(ledger.list_documents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_line_rolls_back_every_earlier_line() {
        let stores = TestStores::new().await;
        let store = stores.tenant("m2023001").await;
        let pen = stocked(&store, "Pen", 10).await;
        let pad = stocked(&store, "Pad", 2).await;

        let err = store
            .ledger()
            .create_document(
                DocumentHeader::new("INV-1", "Acme"),
                vec![LineRequest::new(pen, 5), LineRequest::new(pad, 3)],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(DomainError::InsufficientStock { product_id }) if *product_id == pad
        ));

        assert_eq!(store.products().get(pen).await.unwrap().quantity, 10);
        assert_eq!(store.products().get(pad).await.unwrap().quantity, 2);
        assert_eq!(count(&store, "invoices").await, 0);
        assert_eq!(count(&store, "invoice_lines").await, 0);
    }

    #[tokio::test]
    async fn unknown_product_is_reported_and_nothing_is_written() {
        let stores = TestStores::new().await;
        let store = stores.tenant("m2023001").await;
        let pen = stocked(&store, "Pen", 10).await;
        let ghost = ProductId::new(404);

        let err = store
            .ledger()
            .create_document(
                DocumentHeader::new("INV-1", "Acme"),
                vec![LineRequest::new(pen, 1), LineRequest::new(ghost, 1)],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(DomainError::UnknownProduct { product_id }) if *product_id == ghost
        ));
        assert_eq!(store.products().get(pen).await.unwrap().quantity, 10);
        assert_eq!(count(&store, "invoices").await, 0);
    }

    #[tokio::test]
    async fn header_and_line_validation_happen_before_any_write() {
        let stores = TestStores::new().await;
        let store = stores.tenant("m2023001").await;
        let pen = stocked(&store, "Pen", 10).await;
        let ledger = store.ledger();

        let err = ledger
            .create_document(DocumentHeader::new("", "Acme"), vec![LineRequest::new(pen, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::InvalidHeader(_))));

        let err = ledger
            .create_document(DocumentHeader::new("INV-1", " "), vec![LineRequest::new(pen, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::InvalidHeader(_))));

        let err = ledger
            .create_document(
                DocumentHeader::new("INV-1", "Acme"),
                vec![LineRequest::new(pen, 0), LineRequest::new(pen, -3)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::EmptyLines)));

        assert_eq!(count(&store, "invoices").await, 0);
        assert_eq!(store.products().get(pen).await.unwrap().quantity, 10);
    }

    #[tokio::test]
    async fn non_positive_lines_are_dropped_when_others_remain() {
        let stores = TestStores::new().await;
        let store = stores.tenant("m2023001").await;
        let pen = stocked(&store, "Pen", 10).await;

        let id = store
            .ledger()
            .create_document(
                DocumentHeader::new("INV-1", "Acme"),
                vec![LineRequest::new(pen, 0), LineRequest::new(pen, 2)],
            )
            .await
            .unwrap();

        let (_, lines) = store.ledger().get_document(id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 2);
        assert_eq!(store.products().get(pen).await.unwrap().quantity, 8);
    }

    #[tokio::test]
    async fn repeated_product_lines_draw_from_the_same_stock() {
        let stores = TestStores::new().await;
        let store = stores.tenant("m2023001").await;
        let pen = stocked(&store, "Pen", 5).await;

        let err = store
            .ledger()
            .create_document(
                DocumentHeader::new("INV-1", "Acme"),
                vec![LineRequest::new(pen, 3), LineRequest::new(pen, 3)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::InsufficientStock { .. })));
        assert_eq!(store.products().get(pen).await.unwrap().quantity, 5);

        store
            .ledger()
            .create_document(
                DocumentHeader::new("INV-2", "Acme"),
                vec![LineRequest::new(pen, 3), LineRequest::new(pen, 2)],
            )
            .await
            .unwrap();
        assert_eq!(store.products().get(pen).await.unwrap().quantity, 0);
    }

    #[tokio::test]
    async fn multi_product_document_reads_back_every_line_in_order() {
        let stores = TestStores::new().await;
        let store = stores.tenant("m2023001").await;
        let a = stocked(&store, "A", 5).await;
        let b = stocked(&store, "B", 7).await;
        let c = stocked(&store, "C", 4).await;

        let id = store
            .ledger()
            .create_document(
                DocumentHeader::new("INV-1", "Acme"),
                vec![
                    LineRequest::new(b, 7),
                    LineRequest::new(a, 2),
                    LineRequest::new(c, 1),
                    LineRequest::new(a, 3),
                ],
            )
            .await
            .unwrap();

        assert_eq!(store.products().get(a).await.unwrap().quantity, 0);
        assert_eq!(store.products().get(b).await.unwrap().quantity, 0);
        assert_eq!(store.products().get(c).await.unwrap().quantity, 3);

        let (_, lines) = store.ledger().get_document(id).await.unwrap();
        assert_eq!(
            lines.iter().map(|l| l.product_id).collect::<Vec<_>>(),
            vec![b, a, c, a]
        );
        assert_eq!(
            read_back(&lines),
            vec![
                ("B".to_string(), 7),
                ("A".to_string(), 2),
                ("C".to_string(), 1),
                ("A".to_string(), 3),
            ]
        );

        let summaries = store.ledger().list_documents().await.unwrap();
        assert_eq!(summaries[0].line_count, 4);
        assert_eq!(summaries[0].total_quantity, 13);
    }

    fn read_back(lines: &[DocumentLine]) -> Vec<(String, i64)> {
        lines
            .iter()
            .map(|l| (l.product_name.clone(), l.quantity))
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn commit_takes_exactly_the_requested_stock(
            opening in prop::collection::vec(0i64..12, 1..4),
            picks in prop::collection::vec((0usize..4, 1i64..6), 1..6),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let stores = TestStores::new().await;
                let store = stores.tenant("m2023001").await;

                let mut products = Vec::new();
                for (i, quantity) in opening.iter().enumerate() {
                    products.push(stocked(&store, &format!("P{i}"), *quantity).await);
                }
                let slot = |pick: usize| pick % products.len();

                // Replay the reservations in order to find the first short line.
                let mut remaining = opening.clone();
                let mut short = None;
                for (pick, quantity) in &picks {
                    remaining[slot(*pick)] -= quantity;
                    if remaining[slot(*pick)] < 0 {
                        short = Some(products[slot(*pick)]);
                        break;
                    }
                }

                let lines: Vec<LineRequest> = picks
                    .iter()
                    .map(|(pick, quantity)| LineRequest::new(products[slot(*pick)], *quantity))
                    .collect();
                let result = store
                    .ledger()
                    .create_document(DocumentHeader::new("INV-1", "Acme"), lines)
                    .await;

                let mut on_hand = Vec::new();
                for id in &products {
                    on_hand.push(store.products().get(*id).await.unwrap().quantity);
                }

                match short {
                    Some(product_id) => {
                        let err = result.unwrap_err();
                        assert_eq!(
                            err.as_domain(),
                            Some(&DomainError::InsufficientStock { product_id })
                        );
                        assert_eq!(on_hand, opening);
                        assert_eq!(count(&store, "invoices").await, 0);
                        assert_eq!(count(&store, "invoice_lines").await, 0);
                    }
                    None => {
                        assert_eq!(on_hand, remaining);
                        let (_, lines) = store.ledger().get_document(result.unwrap()).await.unwrap();
                        let expected: Vec<(String, i64)> = picks
                            .iter()
                            .map(|(pick, quantity)| (format!("P{}", slot(*pick)), *quantity))
                            .collect();
                        assert_eq!(read_back(&lines), expected);
                    }
                }
            });
        }
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let stores = TestStores::new().await;
        let store = stores.tenant("m2023001").await;

        let err = store.ledger().get_document(InvoiceId::new(7)).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_documents_orders_by_date_then_id_and_sums_lines() {
        let stores = TestStores::new().await;
        let store = stores.tenant("m2023001").await;
        let pen = stocked(&store, "Pen", 100).await;
        let pad = stocked(&store, "Pad", 100).await;
        let ledger = store.ledger();

        let day = |d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
        let older = ledger
            .create_document(
                DocumentHeader::new("INV-1", "Acme").dated(day(1)),
                vec![LineRequest::new(pen, 1)],
            )
            .await
            .unwrap();
        let first_newer = ledger
            .create_document(
                DocumentHeader::new("DN-1", "Beta")
                    .dated(day(5))
                    .of_type(DocType::DeliveryNote),
                vec![LineRequest::new(pen, 2), LineRequest::new(pad, 3)],
            )
            .await
            .unwrap();
        let second_newer = ledger
            .create_document(
                DocumentHeader::new("INV-2", "Gamma").dated(day(5)),
                vec![LineRequest::new(pad, 4)],
            )
            .await
            .unwrap();

        let summaries = ledger.list_documents().await.unwrap();
        let ids: Vec<InvoiceId> = summaries.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![second_newer, first_newer, older]);

        let delivery = &summaries[1];
        assert_eq!(delivery.doc_type, DocType::DeliveryNote);
        assert_eq!(delivery.line_count, 2);
        assert_eq!(delivery.total_quantity, 5);
    }

    #[tokio::test]
    async fn referenced_product_cannot_be_deleted() {
        let stores = TestStores::new().await;
        let store = stores.tenant("m2023001").await;
        let pen = stocked(&store, "Pen", 10).await;
        let id = store
            .ledger()
            .create_document(DocumentHeader::new("INV-1", "Acme"), vec![LineRequest::new(pen, 1)])
            .await
            .unwrap();

        let err = store.products().delete(pen).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::Conflict(_))));

        let (_, lines) = store.ledger().get_document(id).await.unwrap();
        assert_eq!(lines[0].product_name, "Pen");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_commits_never_oversell() {
        let stores = TestStores::new().await;
        let store = stores.tenant("m2023001").await;
        let pen = stocked(&store, "Pen", 10).await;

        let tasks: Vec<_> = (0..2)
            .map(|i| {
                let ledger = store.ledger();
                tokio::spawn(async move {
                    ledger
                        .create_document(
                            DocumentHeader::new(format!("INV-{i}"), "Acme"),
                            vec![LineRequest::new(pen, 6)],
                        )
                        .await
                })
            })
            .collect();

        let mut committed = 0;
        let mut insufficient = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => committed += 1,
                Err(err) => {
                    assert!(matches!(
                        err.as_domain(),
                        Some(DomainError::InsufficientStock { .. })
                    ));
                    insufficient += 1;
                }
            }
        }

        assert_eq!((committed, insufficient), (1, 1));
        assert_eq!(store.products().get(pen).await.unwrap().quantity, 4);
    }
}
