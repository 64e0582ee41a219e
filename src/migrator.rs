use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_categories_table::Migration),
            Box::new(m20240101_000002_create_parts_table::Migration),
            Box::new(m20240101_000003_create_borrow_requests_table::Migration),
            Box::new(m20240101_000004_create_borrow_records_table::Migration),
            Box::new(m20240101_000005_create_request_history_table::Migration),
            Box::new(m20240101_000006_create_inventory_transactions_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_categories_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_categories_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Categories::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Categories::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Categories::NameEn).string().not_null())
                        .col(ColumnDef::new(Categories::NameAr).string().not_null())
                        .col(
                            ColumnDef::new(Categories::Description)
                                .text()
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(Categories::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Categories::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Categories::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Categories::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum Categories {
        Table,
        Id,
        NameEn,
        NameAr,
        Description,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_parts_table {
    use super::m20240101_000001_create_categories_table::Categories;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_parts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Parts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Parts::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Parts::NameEn).string().not_null())
                        .col(ColumnDef::new(Parts::NameAr).string().not_null())
                        .col(
                            ColumnDef::new(Parts::DescriptionEn)
                                .text()
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(Parts::DescriptionAr)
                                .text()
                                .not_null()
                                .default(""),
                        )
                        .col(ColumnDef::new(Parts::CategoryId).uuid().not_null())
                        .col(
                            ColumnDef::new(Parts::PartNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Parts::Manufacturer).string().null())
                        .col(ColumnDef::new(Parts::Model).string().null())
                        .col(
                            ColumnDef::new(Parts::TotalQuantity)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Parts::AvailableQuantity)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Parts::MinimumStock)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(Parts::Condition).string_len(20).not_null())
                        .col(ColumnDef::new(Parts::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Parts::StorageLocation).string().null())
                        .col(ColumnDef::new(Parts::PurchasePrice).decimal().null())
                        .col(ColumnDef::new(Parts::AddedBy).uuid().null())
                        .col(ColumnDef::new(Parts::Notes).string().null())
                        .col(
                            ColumnDef::new(Parts::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Parts::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Parts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Parts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_parts_category")
                                .from(Parts::Table, Parts::CategoryId)
                                .to(Categories::Table, Categories::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_parts_category_status")
                        .table(Parts::Table)
                        .col(Parts::CategoryId)
                        .col(Parts::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Parts::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum Parts {
        Table,
        Id,
        NameEn,
        NameAr,
        DescriptionEn,
        DescriptionAr,
        CategoryId,
        PartNumber,
        Manufacturer,
        Model,
        TotalQuantity,
        AvailableQuantity,
        MinimumStock,
        Condition,
        Status,
        StorageLocation,
        PurchasePrice,
        AddedBy,
        Notes,
        IsActive,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_borrow_requests_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_borrow_requests_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(BorrowRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BorrowRequests::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BorrowRequests::RequesterId).uuid().not_null())
                        .col(ColumnDef::new(BorrowRequests::Purpose).text().not_null())
                        .col(
                            ColumnDef::new(BorrowRequests::ExpectedReturnDate)
                                .date()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BorrowRequests::Urgency)
                                .string_len(10)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BorrowRequests::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(BorrowRequests::ApprovedBy).uuid().null())
                        .col(
                            ColumnDef::new(BorrowRequests::ApprovalDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(BorrowRequests::RejectionReason)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(BorrowRequests::BorrowedDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(BorrowRequests::ActualReturnDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(BorrowRequests::StaffNotes).string().null())
                        .col(
                            ColumnDef::new(BorrowRequests::RequesterNotes)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(BorrowRequests::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(BorrowRequests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BorrowRequests::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_borrow_requests_status_created")
                        .table(BorrowRequests::Table)
                        .col(BorrowRequests::Status)
                        .col(BorrowRequests::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_borrow_requests_requester_status")
                        .table(BorrowRequests::Table)
                        .col(BorrowRequests::RequesterId)
                        .col(BorrowRequests::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_borrow_requests_expected_return")
                        .table(BorrowRequests::Table)
                        .col(BorrowRequests::ExpectedReturnDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BorrowRequests::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum BorrowRequests {
        Table,
        Id,
        RequesterId,
        Purpose,
        ExpectedReturnDate,
        Urgency,
        Status,
        ApprovedBy,
        ApprovalDate,
        RejectionReason,
        BorrowedDate,
        ActualReturnDate,
        StaffNotes,
        RequesterNotes,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_borrow_records_table {
    use super::m20240101_000002_create_parts_table::Parts;
    use super::m20240101_000003_create_borrow_requests_table::BorrowRequests;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_borrow_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(BorrowRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BorrowRecords::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BorrowRecords::RequestId).uuid().not_null())
                        .col(ColumnDef::new(BorrowRecords::PartId).uuid().null())
                        .col(ColumnDef::new(BorrowRecords::PartName).string().not_null())
                        .col(
                            ColumnDef::new(BorrowRecords::PartNumber)
                                .string()
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(BorrowRecords::PartDescription)
                                .text()
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(BorrowRecords::Quantity)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(BorrowRecords::UnitCost).decimal().null())
                        .col(
                            ColumnDef::new(BorrowRecords::ConditionBorrowed)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BorrowRecords::ConditionReturned)
                                .string_len(20)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(BorrowRecords::DamageDescription)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(BorrowRecords::ReplacementCost)
                                .decimal()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(BorrowRecords::SerialNumbers)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BorrowRecords::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BorrowRecords::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_borrow_records_request")
                                .from(BorrowRecords::Table, BorrowRecords::RequestId)
                                .to(BorrowRequests::Table, BorrowRequests::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_borrow_records_part")
                                .from(BorrowRecords::Table, BorrowRecords::PartId)
                                .to(Parts::Table, Parts::Id),
                        )
                        .to_owned(),
                )
                .await?;

            // One row per distinct part per request
            manager
                .create_index(
                    Index::create()
                        .name("uq_borrow_records_request_part")
                        .table(BorrowRecords::Table)
                        .col(BorrowRecords::RequestId)
                        .col(BorrowRecords::PartName)
                        .col(BorrowRecords::PartNumber)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BorrowRecords::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum BorrowRecords {
        Table,
        Id,
        RequestId,
        PartId,
        PartName,
        PartNumber,
        PartDescription,
        Quantity,
        UnitCost,
        ConditionBorrowed,
        ConditionReturned,
        DamageDescription,
        ReplacementCost,
        SerialNumbers,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000005_create_request_history_table {
    use super::m20240101_000003_create_borrow_requests_table::BorrowRequests;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_request_history_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(RequestHistory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RequestHistory::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RequestHistory::RequestId).uuid().not_null())
                        .col(
                            ColumnDef::new(RequestHistory::Action)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RequestHistory::PerformedBy)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RequestHistory::Notes)
                                .text()
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(RequestHistory::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_request_history_request")
                                .from(RequestHistory::Table, RequestHistory::RequestId)
                                .to(BorrowRequests::Table, BorrowRequests::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_request_history_request_created")
                        .table(RequestHistory::Table)
                        .col(RequestHistory::RequestId)
                        .col(RequestHistory::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(RequestHistory::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum RequestHistory {
        Table,
        Id,
        RequestId,
        Action,
        PerformedBy,
        Notes,
        CreatedAt,
    }
}

mod m20240101_000006_create_inventory_transactions_table {
    use super::m20240101_000002_create_parts_table::Parts;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_inventory_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryTransactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::PartId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::TransactionType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::PreviousQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::NewQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::PerformedBy)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::Reason)
                                .text()
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::ReferenceId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_transactions_part")
                                .from(InventoryTransactions::Table, InventoryTransactions::PartId)
                                .to(Parts::Table, Parts::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_inventory_transactions_part_created")
                        .table(InventoryTransactions::Table)
                        .col(InventoryTransactions::PartId)
                        .col(InventoryTransactions::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(
                    Table::drop()
                        .table(InventoryTransactions::Table)
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(Iden)]
    pub enum InventoryTransactions {
        Table,
        Id,
        PartId,
        TransactionType,
        Quantity,
        PreviousQuantity,
        NewQuantity,
        PerformedBy,
        Reason,
        ReferenceId,
        CreatedAt,
    }
}
