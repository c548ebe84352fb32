use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_registry_tables::Migration),
            Box::new(m20240101_000002_create_stock_tables::Migration),
            Box::new(m20240101_000003_create_document_tables::Migration),
            Box::new(m20240101_000004_create_manufacturing_tables::Migration),
            Box::new(m20240101_000005_create_procurement_tables::Migration),
        ]
    }
}

mod m20240101_000001_create_registry_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_registry_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Items::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Items::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Items::Code).string().not_null().unique_key())
                        .col(ColumnDef::new(Items::Name).string().not_null())
                        .col(ColumnDef::new(Items::Uom).string().not_null())
                        .col(ColumnDef::new(Items::MinLevel).decimal().null())
                        .col(ColumnDef::new(Items::MaxLevel).decimal().null())
                        .col(ColumnDef::new(Items::ReorderLevel).decimal().null())
                        .col(ColumnDef::new(Items::DefaultSupplierId).big_integer().null())
                        .col(
                            ColumnDef::new(Items::RequiresBatch)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Items::RequiresSerial)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Items::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Items::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Items::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Warehouses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Warehouses::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Warehouses::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Warehouses::Name).string().not_null())
                        .col(
                            ColumnDef::new(Warehouses::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Warehouses::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Bins::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Bins::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Bins::WarehouseId).big_integer().not_null())
                        .col(ColumnDef::new(Bins::Code).string().not_null())
                        .col(
                            ColumnDef::new(Bins::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Bins::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bins_warehouse_id")
                                .from(Bins::Table, Bins::WarehouseId)
                                .to(Warehouses::Table, Warehouses::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bins_warehouse_code")
                        .table(Bins::Table)
                        .col(Bins::WarehouseId)
                        .col(Bins::Code)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Bins::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Warehouses::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Items::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Items {
        Table,
        Id,
        Code,
        Name,
        Uom,
        MinLevel,
        MaxLevel,
        ReorderLevel,
        DefaultSupplierId,
        RequiresBatch,
        RequiresSerial,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum Warehouses {
        Table,
        Id,
        Code,
        Name,
        IsActive,
        CreatedAt,
    }

    #[derive(Iden)]
    enum Bins {
        Table,
        Id,
        WarehouseId,
        Code,
        IsActive,
        CreatedAt,
    }
}

mod m20240101_000002_create_stock_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_stock_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockLevels::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockLevels::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLevels::LocationKey)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(StockLevels::ItemId).big_integer().not_null())
                        .col(
                            ColumnDef::new(StockLevels::WarehouseId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockLevels::BinId).big_integer().null())
                        .col(
                            ColumnDef::new(StockLevels::Quantity)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockLevels::ReservedQuantity)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockLevels::AvailableQuantity)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockLevels::AverageCost)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockLevels::LastTransactionDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockLevels::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLevels::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_levels_item_warehouse")
                        .table(StockLevels::Table)
                        .col(StockLevels::ItemId)
                        .col(StockLevels::WarehouseId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(LedgerBalances::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(LedgerBalances::ItemId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LedgerBalances::WarehouseId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LedgerBalances::Balance)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(LedgerBalances::EntryCount)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(LedgerBalances::LastEntryId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(LedgerBalances::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .primary_key(
                            Index::create()
                                .col(LedgerBalances::ItemId)
                                .col(LedgerBalances::WarehouseId),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(LedgerEntries::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(LedgerEntries::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LedgerEntries::TransactionType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LedgerEntries::VoucherNumber)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(LedgerEntries::DocumentId).big_integer().null())
                        .col(ColumnDef::new(LedgerEntries::ItemId).big_integer().not_null())
                        .col(
                            ColumnDef::new(LedgerEntries::WarehouseId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(LedgerEntries::BinId).big_integer().null())
                        .col(
                            ColumnDef::new(LedgerEntries::QuantityIn)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(LedgerEntries::QuantityOut)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(LedgerEntries::UnitCost).decimal().null())
                        .col(
                            ColumnDef::new(LedgerEntries::RunningBalance)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(LedgerEntries::BinBalance).decimal().not_null())
                        .col(
                            ColumnDef::new(LedgerEntries::WorkOrderId)
                                .big_integer()
                                .null(),
                        )
                        .col(ColumnDef::new(LedgerEntries::Reference).string().null())
                        .col(ColumnDef::new(LedgerEntries::CreatedBy).string().not_null())
                        .col(
                            ColumnDef::new(LedgerEntries::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_ledger_entries_item_warehouse")
                        .table(LedgerEntries::Table)
                        .col(LedgerEntries::ItemId)
                        .col(LedgerEntries::WarehouseId)
                        .col(LedgerEntries::Id)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_ledger_entries_voucher")
                        .table(LedgerEntries::Table)
                        .col(LedgerEntries::VoucherNumber)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_ledger_entries_work_order")
                        .table(LedgerEntries::Table)
                        .col(LedgerEntries::WorkOrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(LedgerEntries::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(LedgerBalances::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockLevels::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum StockLevels {
        Table,
        Id,
        LocationKey,
        ItemId,
        WarehouseId,
        BinId,
        Quantity,
        ReservedQuantity,
        AvailableQuantity,
        AverageCost,
        LastTransactionDate,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum LedgerBalances {
        Table,
        ItemId,
        WarehouseId,
        Balance,
        EntryCount,
        LastEntryId,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum LedgerEntries {
        Table,
        Id,
        TransactionType,
        VoucherNumber,
        DocumentId,
        ItemId,
        WarehouseId,
        BinId,
        QuantityIn,
        QuantityOut,
        UnitCost,
        RunningBalance,
        BinBalance,
        WorkOrderId,
        Reference,
        CreatedBy,
        CreatedAt,
    }
}

mod m20240101_000003_create_document_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_document_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(DocumentSequences::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DocumentSequences::Prefix)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(ColumnDef::new(DocumentSequences::Year).integer().not_null())
                        .col(
                            ColumnDef::new(DocumentSequences::LastValue)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(DocumentSequences::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .primary_key(
                            Index::create()
                                .col(DocumentSequences::Prefix)
                                .col(DocumentSequences::Year),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockDocuments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockDocuments::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockDocuments::DocumentType)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockDocuments::DocumentNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(StockDocuments::Status)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockDocuments::WarehouseId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockDocuments::ToWarehouseId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockDocuments::WorkOrderId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockDocuments::PurchaseOrderId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockDocuments::SupplierId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockDocuments::SourceDocumentId)
                                .big_integer()
                                .null(),
                        )
                        .col(ColumnDef::new(StockDocuments::Reason).string().null())
                        .col(ColumnDef::new(StockDocuments::Reference).string().null())
                        .col(
                            ColumnDef::new(StockDocuments::IdempotencyKey)
                                .string()
                                .null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(StockDocuments::CreatedBy)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockDocuments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockDocuments::PostedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockDocuments::ReversedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_documents_type_status")
                        .table(StockDocuments::Table)
                        .col(StockDocuments::DocumentType)
                        .col(StockDocuments::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockDocumentLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockDocumentLines::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockDocumentLines::DocumentId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockDocumentLines::LineNo)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockDocumentLines::ItemId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockDocumentLines::Quantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockDocumentLines::BinId).big_integer().null())
                        .col(
                            ColumnDef::new(StockDocumentLines::ToBinId)
                                .big_integer()
                                .null(),
                        )
                        .col(ColumnDef::new(StockDocumentLines::UnitCost).decimal().null())
                        .col(
                            ColumnDef::new(StockDocumentLines::AdjustmentDirection)
                                .string_len(16)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockDocumentLines::PurchaseOrderLineId)
                                .big_integer()
                                .null(),
                        )
                        .col(ColumnDef::new(StockDocumentLines::Notes).string().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_document_lines_document_id")
                                .from(StockDocumentLines::Table, StockDocumentLines::DocumentId)
                                .to(StockDocuments::Table, StockDocuments::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_document_lines_document")
                        .table(StockDocumentLines::Table)
                        .col(StockDocumentLines::DocumentId)
                        .col(StockDocumentLines::LineNo)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockDocumentLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockDocuments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(DocumentSequences::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum DocumentSequences {
        Table,
        Prefix,
        Year,
        LastValue,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum StockDocuments {
        Table,
        Id,
        DocumentType,
        DocumentNumber,
        Status,
        WarehouseId,
        ToWarehouseId,
        WorkOrderId,
        PurchaseOrderId,
        SupplierId,
        SourceDocumentId,
        Reason,
        Reference,
        IdempotencyKey,
        CreatedBy,
        CreatedAt,
        PostedAt,
        ReversedAt,
    }

    #[derive(Iden)]
    enum StockDocumentLines {
        Table,
        Id,
        DocumentId,
        LineNo,
        ItemId,
        Quantity,
        BinId,
        ToBinId,
        UnitCost,
        AdjustmentDirection,
        PurchaseOrderLineId,
        Notes,
    }
}

mod m20240101_000004_create_manufacturing_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_manufacturing_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Boms::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Boms::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Boms::ItemId).big_integer().not_null())
                        .col(ColumnDef::new(Boms::Version).integer().not_null())
                        .col(
                            ColumnDef::new(Boms::IsActive)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Boms::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_boms_item_version")
                        .table(Boms::Table)
                        .col(Boms::ItemId)
                        .col(Boms::Version)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BomLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BomLines::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BomLines::BomId).big_integer().not_null())
                        .col(
                            ColumnDef::new(BomLines::ComponentItemId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomLines::QuantityPerUnit)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomLines::WastagePercent)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_lines_bom_id")
                                .from(BomLines::Table, BomLines::BomId)
                                .to(Boms::Table, Boms::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(WorkOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WorkOrders::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::WorkOrderNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(WorkOrders::ItemId).big_integer().not_null())
                        .col(ColumnDef::new(WorkOrders::BomId).big_integer().not_null())
                        .col(
                            ColumnDef::new(WorkOrders::WarehouseId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::PlannedQuantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::CompletedQuantity)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(WorkOrders::Status).string_len(16).not_null())
                        .col(ColumnDef::new(WorkOrders::CreatedBy).string().not_null())
                        .col(
                            ColumnDef::new(WorkOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WorkOrders::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(BomLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Boms::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Boms {
        Table,
        Id,
        ItemId,
        Version,
        IsActive,
        CreatedAt,
    }

    #[derive(Iden)]
    enum BomLines {
        Table,
        Id,
        BomId,
        ComponentItemId,
        QuantityPerUnit,
        WastagePercent,
    }

    #[derive(Iden)]
    enum WorkOrders {
        Table,
        Id,
        WorkOrderNumber,
        ItemId,
        BomId,
        WarehouseId,
        PlannedQuantity,
        CompletedQuantity,
        Status,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000005_create_procurement_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_procurement_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrders::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::PoNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::SupplierId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::Status)
                                .string_len(24)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::CreatedBy).string().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrderLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrderLines::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::PurchaseOrderId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::ItemId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::OrderedQuantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::ReceivedQuantity)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(PurchaseOrderLines::UnitPrice).decimal().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_order_lines_po_id")
                                .from(PurchaseOrderLines::Table, PurchaseOrderLines::PurchaseOrderId)
                                .to(PurchaseOrders::Table, PurchaseOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseOrderLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrders::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum PurchaseOrders {
        Table,
        Id,
        PoNumber,
        SupplierId,
        Status,
        CreatedBy,
        CreatedAt,
    }

    #[derive(Iden)]
    enum PurchaseOrderLines {
        Table,
        Id,
        PurchaseOrderId,
        ItemId,
        OrderedQuantity,
        ReceivedQuantity,
        UnitPrice,
    }
}
