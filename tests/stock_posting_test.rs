mod common;

use assert_matches::assert_matches;
use common::TestContext;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use stockledger_api::{
    config::NegativeStockPolicy,
    entities::{
        ledger_entry::LedgerTransactionType,
        purchase_order::PurchaseOrderStatus,
        stock_document::{DocumentStatus, DocumentType},
        stock_document_line::AdjustmentDirection,
    },
    errors::ServiceError,
    events::Event,
    services::{
        bom::{BomLineInput, CreateBomInput},
        ledger::LedgerFilter,
        posting::{
            AdjustmentInput, AdjustmentLineInput, DocumentFilter, GoodsReceiptInput,
            MaterialIssueInput, MaterialReturnInput, ReceiptLineInput, ReverseDocumentInput,
            StockLineInput, TransferInput, TransferLineInput,
        },
        procurement::{CreatePurchaseOrderInput, PurchaseOrderLineInput},
        stock::ReservationInput,
        work_orders::CreateWorkOrderInput,
    },
};

fn issue(warehouse_id: i64, item_id: i64, bin_id: Option<i64>, quantity: Decimal) -> MaterialIssueInput {
    MaterialIssueInput {
        warehouse_id,
        work_order_id: None,
        reference: None,
        idempotency_key: None,
        lines: vec![StockLineInput {
            item_id,
            quantity,
            bin_id,
            notes: None,
        }],
    }
}

fn adjustment(
    warehouse_id: i64,
    item_id: i64,
    bin_id: Option<i64>,
    quantity: Decimal,
    direction: AdjustmentDirection,
) -> AdjustmentInput {
    AdjustmentInput {
        warehouse_id,
        reason: "cycle count".to_string(),
        reference: None,
        idempotency_key: None,
        lines: vec![AdjustmentLineInput {
            item_id,
            quantity,
            direction,
            bin_id,
            notes: None,
        }],
    }
}

fn transfer(from: i64, to: i64, item_id: i64, from_bin: Option<i64>, quantity: Decimal) -> TransferInput {
    TransferInput {
        from_warehouse_id: from,
        to_warehouse_id: to,
        reference: None,
        idempotency_key: None,
        lines: vec![TransferLineInput {
            item_id,
            quantity,
            from_bin_id: from_bin,
            to_bin_id: None,
            notes: None,
        }],
    }
}

/// GRN, MIN against a work order, MRN against that MIN, transfer to a second
/// warehouse and an over-sized adjustment, checked step by step.
#[tokio::test]
async fn beam_walkthrough_keeps_stock_and_ledger_in_step() {
    let ctx = TestContext::new().await;
    let services = ctx.services();
    let beam = ctx.item("BEAM-2M-001").await;
    let frame = ctx.item("FRAME-001").await;
    let wh1 = ctx.warehouse("WH1").await;
    let wh2 = ctx.warehouse("WH2").await;
    let bin_a = ctx.bin(wh1.id, "A").await;

    // receipt of 200 @ 5.00
    let grn = ctx
        .receive(beam.id, wh1.id, Some(bin_a.id), dec!(200), dec!(5.00))
        .await;
    assert_eq!(grn.document.document_type, DocumentType::Grn);
    assert_eq!(grn.document.status, DocumentStatus::Completed);
    assert!(grn.document.document_number.starts_with("GRN-"));
    assert_eq!(grn.entries.len(), 1);
    assert_eq!(grn.entries[0].quantity_in, dec!(200));
    assert_eq!(grn.entries[0].running_balance, dec!(200));

    let row = services
        .stock
        .get(beam.id, wh1.id, Some(bin_a.id))
        .await
        .unwrap()
        .expect("stock row");
    assert_eq!(row.quantity, dec!(200));
    assert_eq!(row.available_quantity, dec!(200));
    assert_eq!(row.average_cost, dec!(5.00));

    // issue 50 against a work order
    let bom = services
        .bom
        .create_bom(CreateBomInput {
            item_id: frame.id,
            lines: vec![BomLineInput {
                component_item_id: beam.id,
                quantity_per_unit: dec!(4),
                wastage_percent: Decimal::ZERO,
            }],
        })
        .await
        .unwrap();
    services.bom.activate_bom(bom.bom.id).await.unwrap();
    let wo = services
        .work_orders
        .create_work_order(
            CreateWorkOrderInput {
                item_id: frame.id,
                warehouse_id: wh1.id,
                planned_quantity: dec!(10),
                bom_id: None,
            },
            "planner",
        )
        .await
        .unwrap();

    let mut min_input = issue(wh1.id, beam.id, Some(bin_a.id), dec!(50));
    min_input.work_order_id = Some(wo.id);
    let min = services.posting.post_issue(min_input, "storekeeper").await.unwrap();
    assert_eq!(min.entries.len(), 1);
    assert_eq!(min.entries[0].quantity_out, dec!(50));
    assert_eq!(min.entries[0].running_balance, dec!(150));
    assert_eq!(min.entries[0].work_order_id, Some(wo.id));
    assert_eq!(min.entries[0].transaction_type, LedgerTransactionType::Issue);
    assert_eq!(ctx.on_hand(beam.id, wh1.id, Some(bin_a.id)).await, dec!(150));

    // return 10 against the issue
    let mrn = services
        .posting
        .post_return(
            MaterialReturnInput {
                warehouse_id: wh1.id,
                source_document_id: Some(min.document.id),
                work_order_id: Some(wo.id),
                reference: None,
                idempotency_key: None,
                lines: vec![StockLineInput {
                    item_id: beam.id,
                    quantity: dec!(10),
                    bin_id: Some(bin_a.id),
                    notes: None,
                }],
            },
            "storekeeper",
        )
        .await
        .unwrap();
    assert_eq!(mrn.entries[0].running_balance, dec!(160));
    assert_eq!(ctx.on_hand(beam.id, wh1.id, Some(bin_a.id)).await, dec!(160));

    // transfer 30 to the second warehouse
    let trf = services
        .posting
        .post_transfer(transfer(wh1.id, wh2.id, beam.id, Some(bin_a.id), dec!(30)), "storekeeper")
        .await
        .unwrap();
    assert_eq!(trf.entries.len(), 2);
    assert_eq!(trf.entries[0].transaction_type, LedgerTransactionType::TransferOut);
    assert_eq!(trf.entries[0].quantity_out, dec!(30));
    assert_eq!(trf.entries[1].transaction_type, LedgerTransactionType::TransferIn);
    assert_eq!(trf.entries[1].quantity_in, dec!(30));
    assert_eq!(trf.entries[1].unit_cost, Some(dec!(5.00)));
    assert_eq!(ctx.on_hand(beam.id, wh1.id, Some(bin_a.id)).await, dec!(130));
    assert_eq!(ctx.on_hand(beam.id, wh2.id, None).await, dec!(30));

    // decrease by 500 with 130 on hand is rejected and changes nothing
    let err = services
        .posting
        .post_adjustment(
            adjustment(wh1.id, beam.id, Some(bin_a.id), dec!(500), AdjustmentDirection::Decrease),
            "auditor",
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));
    assert_eq!(ctx.on_hand(beam.id, wh1.id, Some(bin_a.id)).await, dec!(130));

    let report = services.ledger.reconcile(beam.id, wh1.id).await.unwrap();
    assert!(report.is_consistent);
    assert_eq!(report.stock_on_hand, dec!(130));
    assert_eq!(report.entry_count, 4);
}

#[tokio::test]
async fn clamp_policy_removes_only_what_is_on_hand() {
    let ctx = TestContext::with_policy(NegativeStockPolicy::Clamp).await;
    let beam = ctx.item("BEAM-2M-001").await;
    let wh = ctx.warehouse("WH1").await;
    ctx.receive(beam.id, wh.id, None, dec!(130), dec!(5)).await;

    let adj = ctx
        .services()
        .posting
        .post_adjustment(
            adjustment(wh.id, beam.id, None, dec!(500), AdjustmentDirection::Decrease),
            "auditor",
        )
        .await
        .unwrap();

    assert_eq!(adj.entries[0].quantity_out, dec!(130));
    assert_eq!(adj.entries[0].running_balance, Decimal::ZERO);
    // the document keeps the requested quantity
    assert_eq!(adj.lines[0].quantity, dec!(500));
    assert_eq!(ctx.on_hand(beam.id, wh.id, None).await, Decimal::ZERO);
}

#[tokio::test]
async fn clamped_transfer_moves_only_the_applied_quantity() {
    let ctx = TestContext::with_policy(NegativeStockPolicy::Clamp).await;
    let item = ctx.item("BOLT-M8").await;
    let wh1 = ctx.warehouse("WH1").await;
    let wh2 = ctx.warehouse("WH2").await;
    ctx.receive(item.id, wh1.id, None, dec!(12), dec!(0.10)).await;

    let trf = ctx
        .services()
        .posting
        .post_transfer(transfer(wh1.id, wh2.id, item.id, None, dec!(20)), "storekeeper")
        .await
        .unwrap();

    assert_eq!(trf.entries[0].quantity_out, dec!(12));
    assert_eq!(trf.entries[1].quantity_in, dec!(12));
    assert_eq!(ctx.on_hand(item.id, wh1.id, None).await, Decimal::ZERO);
    assert_eq!(ctx.on_hand(item.id, wh2.id, None).await, dec!(12));
}

#[tokio::test]
async fn failing_line_leaves_no_trace_of_earlier_lines() {
    let ctx = TestContext::new().await;
    let bolt = ctx.item("BOLT-M8").await;
    let nut = ctx.item("NUT-M8").await;
    let wh = ctx.warehouse("WH1").await;
    ctx.receive(bolt.id, wh.id, None, dec!(100), dec!(0.10)).await;
    ctx.receive(nut.id, wh.id, None, dec!(5), dec!(0.05)).await;

    let err = ctx
        .services()
        .posting
        .post_issue(
            MaterialIssueInput {
                warehouse_id: wh.id,
                work_order_id: None,
                reference: None,
                idempotency_key: None,
                lines: vec![
                    StockLineInput {
                        item_id: bolt.id,
                        quantity: dec!(40),
                        bin_id: None,
                        notes: None,
                    },
                    StockLineInput {
                        item_id: nut.id,
                        quantity: dec!(6),
                        bin_id: None,
                        notes: None,
                    },
                ],
            },
            "storekeeper",
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    assert_eq!(ctx.on_hand(bolt.id, wh.id, None).await, dec!(100));
    assert_eq!(ctx.on_hand(nut.id, wh.id, None).await, dec!(5));
    let issues = ctx
        .services()
        .ledger
        .query(&LedgerFilter {
            transaction_type: Some(LedgerTransactionType::Issue),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(issues.is_empty());
    let docs = ctx
        .services()
        .posting
        .list_documents(&DocumentFilter {
            document_type: Some(DocumentType::Min),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(docs.is_empty());
}

#[tokio::test]
async fn unknown_references_are_rejected_with_the_line_number() {
    let ctx = TestContext::new().await;
    let item = ctx.item("BOLT-M8").await;
    let wh = ctx.warehouse("WH1").await;
    let other_wh = ctx.warehouse("WH2").await;
    let foreign_bin = ctx.bin(other_wh.id, "X").await;

    let err = ctx
        .services()
        .posting
        .post_receipt(
            GoodsReceiptInput {
                warehouse_id: wh.id,
                supplier_id: None,
                purchase_order_id: None,
                reference: None,
                idempotency_key: None,
                lines: vec![
                    ReceiptLineInput {
                        item_id: item.id,
                        quantity: dec!(1),
                        bin_id: None,
                        unit_cost: Some(dec!(1)),
                        purchase_order_line_id: None,
                        notes: None,
                    },
                    ReceiptLineInput {
                        item_id: 9_999,
                        quantity: dec!(1),
                        bin_id: None,
                        unit_cost: Some(dec!(1)),
                        purchase_order_line_id: None,
                        notes: None,
                    },
                ],
            },
            "receiver",
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(msg) if msg.starts_with("line 2:"));

    let err = ctx
        .services()
        .posting
        .post_issue(issue(wh.id, item.id, Some(foreign_bin.id), dec!(1)), "storekeeper")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(msg) if msg.starts_with("line 1:"));

    let err = ctx
        .services()
        .posting
        .post_issue(issue(404, item.id, None, dec!(1)), "storekeeper")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    assert_eq!(ctx.on_hand(item.id, wh.id, None).await, Decimal::ZERO);
}

#[tokio::test]
async fn non_positive_quantities_and_empty_documents_are_invalid() {
    let ctx = TestContext::new().await;
    let item = ctx.item("BOLT-M8").await;
    let wh = ctx.warehouse("WH1").await;

    for quantity in [Decimal::ZERO, dec!(-3)] {
        let err = ctx
            .services()
            .posting
            .post_issue(issue(wh.id, item.id, None, quantity), "storekeeper")
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
    }

    let mut empty = issue(wh.id, item.id, None, dec!(1));
    empty.lines.clear();
    let err = ctx
        .services()
        .posting
        .post_issue(empty, "storekeeper")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let mut no_reason = adjustment(wh.id, item.id, None, dec!(1), AdjustmentDirection::Increase);
    no_reason.reason = "   ".to_string();
    let err = ctx
        .services()
        .posting
        .post_adjustment(no_reason, "auditor")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn transfer_within_the_same_location_is_invalid() {
    let ctx = TestContext::new().await;
    let item = ctx.item("BOLT-M8").await;
    let wh = ctx.warehouse("WH1").await;
    let bin_a = ctx.bin(wh.id, "A").await;
    let bin_b = ctx.bin(wh.id, "B").await;
    ctx.receive(item.id, wh.id, Some(bin_a.id), dec!(10), dec!(1)).await;

    // bin A to unbinned stock is a real move
    ctx.services()
        .posting
        .post_transfer(transfer(wh.id, wh.id, item.id, Some(bin_a.id), dec!(5)), "storekeeper")
        .await
        .unwrap();

    let mut same = transfer(wh.id, wh.id, item.id, Some(bin_b.id), dec!(1));
    same.lines[0].to_bin_id = Some(bin_b.id);
    let err = ctx
        .services()
        .posting
        .post_transfer(same, "storekeeper")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let mut bin_move = transfer(wh.id, wh.id, item.id, Some(bin_a.id), dec!(5));
    bin_move.lines[0].to_bin_id = Some(bin_b.id);
    ctx.services()
        .posting
        .post_transfer(bin_move, "storekeeper")
        .await
        .unwrap();
    assert_eq!(ctx.on_hand(item.id, wh.id, Some(bin_a.id)).await, Decimal::ZERO);
    assert_eq!(ctx.on_hand(item.id, wh.id, Some(bin_b.id)).await, dec!(5));
    assert_eq!(ctx.on_hand(item.id, wh.id, None).await, dec!(5));

    // the pair balance does not move on an intra-warehouse transfer
    let history = ctx.services().ledger.history(item.id, wh.id).await.unwrap();
    assert_eq!(history.last().map(|e| e.running_balance), Some(dec!(10)));
}

#[tokio::test]
async fn replayed_idempotency_key_returns_the_original_number() {
    let ctx = TestContext::new().await;
    let item = ctx.item("BOLT-M8").await;
    let wh = ctx.warehouse("WH1").await;
    let input = GoodsReceiptInput {
        warehouse_id: wh.id,
        supplier_id: None,
        purchase_order_id: None,
        reference: Some("delivery 4471".to_string()),
        idempotency_key: Some("grn-4471".to_string()),
        lines: vec![ReceiptLineInput {
            item_id: item.id,
            quantity: dec!(25),
            bin_id: None,
            unit_cost: Some(dec!(0.12)),
            purchase_order_line_id: None,
            notes: None,
        }],
    };

    let first = ctx
        .services()
        .posting
        .post_receipt(input.clone(), "receiver")
        .await
        .unwrap();
    let err = ctx
        .services()
        .posting
        .post_receipt(input, "receiver")
        .await
        .unwrap_err();

    assert_matches!(
        err,
        ServiceError::DuplicateDocument { document_number } if document_number == first.document.document_number
    );
    assert_eq!(ctx.on_hand(item.id, wh.id, None).await, dec!(25));
}

#[tokio::test]
async fn reversal_restores_stock_and_cancels_the_document() {
    let ctx = TestContext::new().await;
    let item = ctx.item("BOLT-M8").await;
    let wh = ctx.warehouse("WH1").await;
    ctx.receive(item.id, wh.id, None, dec!(100), dec!(2)).await;
    let min = ctx
        .services()
        .posting
        .post_issue(issue(wh.id, item.id, None, dec!(30)), "storekeeper")
        .await
        .unwrap();

    let reversed = ctx
        .services()
        .posting
        .reverse_document(
            min.document.id,
            ReverseDocumentInput {
                reason: "issued to the wrong job".to_string(),
            },
            "supervisor",
        )
        .await
        .unwrap();

    assert_eq!(reversed.document.status, DocumentStatus::Cancelled);
    assert!(reversed.document.reversed_at.is_some());
    assert_eq!(reversed.entries.len(), 2);
    let reversal = &reversed.entries[1];
    assert_eq!(reversal.transaction_type, LedgerTransactionType::Reversal);
    assert_eq!(reversal.voucher_number, min.document.document_number);
    assert_eq!(reversal.quantity_in, dec!(30));
    assert_eq!(reversal.running_balance, dec!(100));
    assert_eq!(ctx.on_hand(item.id, wh.id, None).await, dec!(100));

    let again = ctx
        .services()
        .posting
        .reverse_document(
            min.document.id,
            ReverseDocumentInput {
                reason: "twice".to_string(),
            },
            "supervisor",
        )
        .await
        .unwrap_err();
    assert_matches!(again, ServiceError::ValidationError(_));

    let missing = ctx
        .services()
        .posting
        .reverse_document(
            4_040,
            ReverseDocumentInput {
                reason: "nothing".to_string(),
            },
            "supervisor",
        )
        .await
        .unwrap_err();
    assert_matches!(missing, ServiceError::NotFound(_));
}

#[tokio::test]
async fn issue_with_open_returns_is_reversed_only_after_its_returns() {
    let ctx = TestContext::new().await;
    let item = ctx.item("BEAM-2M-001").await;
    let wh = ctx.warehouse("WH1").await;
    ctx.receive(item.id, wh.id, None, dec!(200), dec!(5)).await;
    let min = ctx
        .services()
        .posting
        .post_issue(issue(wh.id, item.id, None, dec!(50)), "storekeeper")
        .await
        .unwrap();
    let mrn = ctx
        .services()
        .posting
        .post_return(
            MaterialReturnInput {
                warehouse_id: wh.id,
                source_document_id: Some(min.document.id),
                work_order_id: None,
                reference: None,
                idempotency_key: None,
                lines: vec![StockLineInput {
                    item_id: item.id,
                    quantity: dec!(10),
                    bin_id: None,
                    notes: None,
                }],
            },
            "storekeeper",
        )
        .await
        .unwrap();
    assert_eq!(ctx.on_hand(item.id, wh.id, None).await, dec!(160));

    let reverse = |document_id: i64| {
        let posting = ctx.services().posting.clone();
        async move {
            posting
                .reverse_document(
                    document_id,
                    ReverseDocumentInput {
                        reason: "booked against the wrong job".to_string(),
                    },
                    "supervisor",
                )
                .await
        }
    };

    let err = reverse(min.document.id).await.unwrap_err();
    assert_matches!(
        err,
        ServiceError::ValidationError(msg) if msg.contains(&mrn.document.document_number)
    );
    assert_eq!(ctx.on_hand(item.id, wh.id, None).await, dec!(160));
    let unchanged = ctx.services().posting.get_document(min.document.id).await.unwrap();
    assert_eq!(unchanged.document.status, DocumentStatus::Completed);

    reverse(mrn.document.id).await.unwrap();
    assert_eq!(ctx.on_hand(item.id, wh.id, None).await, dec!(150));

    let reversed = reverse(min.document.id).await.unwrap();
    assert_eq!(reversed.document.status, DocumentStatus::Cancelled);
    assert_eq!(ctx.on_hand(item.id, wh.id, None).await, dec!(200));
    assert!(ctx.services().ledger.reconcile(item.id, wh.id).await.unwrap().is_consistent);
}

#[tokio::test]
async fn receipt_reversal_fails_once_the_stock_is_gone() {
    let ctx = TestContext::new().await;
    let item = ctx.item("BOLT-M8").await;
    let wh = ctx.warehouse("WH1").await;
    let grn = ctx.receive(item.id, wh.id, None, dec!(10), dec!(1)).await;
    ctx.services()
        .posting
        .post_issue(issue(wh.id, item.id, None, dec!(8)), "storekeeper")
        .await
        .unwrap();

    let err = ctx
        .services()
        .posting
        .reverse_document(
            grn.document.id,
            ReverseDocumentInput {
                reason: "wrong supplier".to_string(),
            },
            "supervisor",
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    let unchanged = ctx.services().posting.get_document(grn.document.id).await.unwrap();
    assert_eq!(unchanged.document.status, DocumentStatus::Completed);
    assert_eq!(ctx.on_hand(item.id, wh.id, None).await, dec!(2));
}

#[tokio::test]
async fn receipts_against_a_purchase_order_track_outstanding_quantity() {
    let ctx = TestContext::new().await;
    let item = ctx.item("BEAM-2M-001").await;
    let wh = ctx.warehouse("WH1").await;
    let po = ctx
        .services()
        .purchase_orders
        .create_purchase_order(
            CreatePurchaseOrderInput {
                supplier_id: 17,
                lines: vec![PurchaseOrderLineInput {
                    item_id: item.id,
                    ordered_quantity: dec!(100),
                    unit_price: Some(dec!(5)),
                }],
            },
            "buyer",
        )
        .await
        .unwrap();
    assert!(po.purchase_order.po_number.starts_with("PO-"));
    let po_line = po.lines[0].id;

    let receipt = |quantity: Decimal| GoodsReceiptInput {
        warehouse_id: wh.id,
        supplier_id: Some(17),
        purchase_order_id: Some(po.purchase_order.id),
        reference: None,
        idempotency_key: None,
        lines: vec![ReceiptLineInput {
            item_id: item.id,
            quantity,
            bin_id: None,
            unit_cost: Some(dec!(5)),
            purchase_order_line_id: Some(po_line),
            notes: None,
        }],
    };

    let first = ctx
        .services()
        .posting
        .post_receipt(receipt(dec!(60)), "receiver")
        .await
        .unwrap();
    let after_first = ctx
        .services()
        .purchase_orders
        .get_purchase_order(po.purchase_order.id)
        .await
        .unwrap();
    assert_eq!(after_first.lines[0].received_quantity, dec!(60));
    assert_eq!(after_first.purchase_order.status, PurchaseOrderStatus::PartiallyReceived);

    let err = ctx
        .services()
        .posting
        .post_receipt(receipt(dec!(41)), "receiver")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(msg) if msg.contains("exceeds outstanding"));

    ctx.services()
        .posting
        .post_receipt(receipt(dec!(40)), "receiver")
        .await
        .unwrap();
    let received = ctx
        .services()
        .purchase_orders
        .get_purchase_order(po.purchase_order.id)
        .await
        .unwrap();
    assert_eq!(received.purchase_order.status, PurchaseOrderStatus::Received);

    ctx.services()
        .posting
        .reverse_document(
            first.document.id,
            ReverseDocumentInput {
                reason: "damaged".to_string(),
            },
            "supervisor",
        )
        .await
        .unwrap();
    let reopened = ctx
        .services()
        .purchase_orders
        .get_purchase_order(po.purchase_order.id)
        .await
        .unwrap();
    assert_eq!(reopened.lines[0].received_quantity, dec!(40));
    assert_eq!(reopened.purchase_order.status, PurchaseOrderStatus::PartiallyReceived);
}

#[tokio::test]
async fn returns_cannot_exceed_what_was_issued() {
    let ctx = TestContext::new().await;
    let item = ctx.item("BOLT-M8").await;
    let other = ctx.item("NUT-M8").await;
    let wh = ctx.warehouse("WH1").await;
    ctx.receive(item.id, wh.id, None, dec!(100), dec!(1)).await;
    let min = ctx
        .services()
        .posting
        .post_issue(issue(wh.id, item.id, None, dec!(20)), "storekeeper")
        .await
        .unwrap();

    let ret = |item_id: i64, quantity: Decimal| MaterialReturnInput {
        warehouse_id: wh.id,
        source_document_id: Some(min.document.id),
        work_order_id: None,
        reference: None,
        idempotency_key: None,
        lines: vec![StockLineInput {
            item_id,
            quantity,
            bin_id: None,
            notes: None,
        }],
    };

    ctx.services()
        .posting
        .post_return(ret(item.id, dec!(15)), "storekeeper")
        .await
        .unwrap();
    let err = ctx
        .services()
        .posting
        .post_return(ret(item.id, dec!(6)), "storekeeper")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = ctx
        .services()
        .posting
        .post_return(ret(other.id, dec!(1)), "storekeeper")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(msg) if msg.contains("was not issued"));

    ctx.services()
        .posting
        .post_return(ret(item.id, dec!(5)), "storekeeper")
        .await
        .unwrap();
    assert_eq!(ctx.on_hand(item.id, wh.id, None).await, dec!(100));
}

#[tokio::test]
async fn reserved_stock_cannot_be_issued() {
    let ctx = TestContext::new().await;
    let item = ctx.item("BOLT-M8").await;
    let wh = ctx.warehouse("WH1").await;
    ctx.receive(item.id, wh.id, None, dec!(10), dec!(1)).await;

    let row = ctx
        .services()
        .stock
        .reserve(ReservationInput {
            item_id: item.id,
            warehouse_id: wh.id,
            bin_id: None,
            quantity: dec!(7),
        })
        .await
        .unwrap();
    assert_eq!(row.reserved_quantity, dec!(7));
    assert_eq!(row.available_quantity, dec!(3));

    let err = ctx
        .services()
        .posting
        .post_issue(issue(wh.id, item.id, None, dec!(4)), "storekeeper")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    let over_reserve = ctx
        .services()
        .stock
        .reserve(ReservationInput {
            item_id: item.id,
            warehouse_id: wh.id,
            bin_id: None,
            quantity: dec!(4),
        })
        .await
        .unwrap_err();
    assert_matches!(over_reserve, ServiceError::InsufficientStock(_));

    let released = ctx
        .services()
        .stock
        .release(ReservationInput {
            item_id: item.id,
            warehouse_id: wh.id,
            bin_id: None,
            quantity: dec!(7),
        })
        .await
        .unwrap();
    assert_eq!(released.available_quantity, dec!(10));

    ctx.services()
        .posting
        .post_issue(issue(wh.id, item.id, None, dec!(4)), "storekeeper")
        .await
        .unwrap();
    // reservations never reach the ledger
    let history = ctx.services().ledger.history(item.id, wh.id).await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn posting_publishes_stock_and_low_stock_events() {
    let mut ctx = TestContext::new().await;
    let item = ctx.item_with_reorder_level("BOLT-M8", dec!(20)).await;
    let wh = ctx.warehouse("WH1").await;
    ctx.receive(item.id, wh.id, None, dec!(50), dec!(1)).await;

    let events = ctx.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::DocumentPosted { document_type: DocumentType::Grn, .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::StockLevelChanged { quantity, transaction_type: LedgerTransactionType::Receipt, .. } if *quantity == dec!(50)
    )));
    assert!(!events.iter().any(|e| matches!(e, Event::LowStock { .. })));

    ctx.services()
        .posting
        .post_issue(issue(wh.id, item.id, None, dec!(35)), "storekeeper")
        .await
        .unwrap();
    let events = ctx.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::LowStock { on_hand, threshold, .. } if *on_hand == dec!(15) && *threshold == dec!(20)
    )));
}

#[tokio::test]
async fn document_numbers_are_sequential_per_type() {
    let ctx = TestContext::new().await;
    let item = ctx.item("BOLT-M8").await;
    let wh = ctx.warehouse("WH1").await;

    let first = ctx.receive(item.id, wh.id, None, dec!(1), dec!(1)).await;
    let second = ctx.receive(item.id, wh.id, None, dec!(1), dec!(1)).await;
    let min = ctx
        .services()
        .posting
        .post_issue(issue(wh.id, item.id, None, dec!(1)), "storekeeper")
        .await
        .unwrap();

    let year = stockledger_api::services::document_numbers::current_year();
    assert_eq!(first.document.document_number, format!("GRN-{}-0001", year));
    assert_eq!(second.document.document_number, format!("GRN-{}-0002", year));
    assert_eq!(min.document.document_number, format!("MIN-{}-0001", year));

    let listed = ctx
        .services()
        .posting
        .list_documents(&DocumentFilter {
            document_type: Some(DocumentType::Grn),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second.document.id);
}

#[tokio::test]
async fn weighted_average_cost_follows_receipts() {
    let ctx = TestContext::new().await;
    let item = ctx.item("BEAM-2M-001").await;
    let wh = ctx.warehouse("WH1").await;

    ctx.receive(item.id, wh.id, None, dec!(100), dec!(5)).await;
    ctx.receive(item.id, wh.id, None, dec!(100), dec!(7)).await;
    let row = ctx
        .services()
        .stock
        .get(item.id, wh.id, None)
        .await
        .unwrap()
        .expect("stock row");
    assert_eq!(row.average_cost, dec!(6));

    let min = ctx
        .services()
        .posting
        .post_issue(issue(wh.id, item.id, None, dec!(50)), "storekeeper")
        .await
        .unwrap();
    assert_eq!(min.entries[0].unit_cost, Some(dec!(6)));
}
