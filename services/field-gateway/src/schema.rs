//! Static Dataverse schema map
//!
//! Entity-set names, column names and navigation properties for the Field
//! Service tables the gateway touches. Query builders read names from
//! [`SCHEMA`]; nothing else in the service spells a Dataverse column.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Bookable resource (a contractor or technician).
pub struct ContractorSchema {
    pub entity_set: &'static str,
    pub id: &'static str,
    pub name: &'static str,
    pub email: &'static str,
}

/// Bookable resource booking (a scheduled visit).
pub struct BookingSchema {
    pub entity_set: &'static str,
    pub id: &'static str,
    pub name: &'static str,
    pub start: &'static str,
    pub end: &'static str,
    /// Lookup to the bookable resource.
    pub resource_lookup: &'static str,
    /// Lookup to the booking status; its display label comes back as a
    /// formatted-value annotation.
    pub status_lookup: &'static str,
    /// Single-valued navigation to the work order.
    pub work_order_nav: &'static str,
}

pub struct WorkOrderSchema {
    pub entity_set: &'static str,
    pub id: &'static str,
    pub number: &'static str,
    pub system_status: &'static str,
    pub summary: &'static str,
    pub instructions: &'static str,
    pub service_account_nav: &'static str,
    pub incident_type_nav: &'static str,
    pub incident_type_name: &'static str,
    /// Collection-valued navigation to the work order's bookings.
    pub bookings_nav: &'static str,
}

pub struct AccountSchema {
    pub entity_set: &'static str,
    pub id: &'static str,
    pub name: &'static str,
    pub address: &'static str,
    pub phone: &'static str,
}

/// Note/attachment rows. Photos are stored as document annotations.
pub struct AnnotationSchema {
    pub entity_set: &'static str,
    pub id: &'static str,
    pub subject: &'static str,
    pub filename: &'static str,
    pub mime_type: &'static str,
    pub document_body: &'static str,
    pub is_document: &'static str,
    pub file_size: &'static str,
    pub created_on: &'static str,
    /// Lookup read back when filtering by parent record.
    pub regarding_lookup: &'static str,
    /// Binding key used when creating a note against a work order.
    pub regarding_work_order_bind: &'static str,
}

pub struct SchemaMap {
    pub contractor: ContractorSchema,
    pub booking: BookingSchema,
    pub work_order: WorkOrderSchema,
    pub account: AccountSchema,
    pub annotation: AnnotationSchema,
}

pub static SCHEMA: SchemaMap = SchemaMap {
    contractor: ContractorSchema {
        entity_set: "bookableresources",
        id: "bookableresourceid",
        name: "name",
        email: "msdyn_primaryemail",
    },
    booking: BookingSchema {
        entity_set: "bookableresourcebookings",
        id: "bookableresourcebookingid",
        name: "name",
        start: "starttime",
        end: "endtime",
        resource_lookup: "_resource_value",
        status_lookup: "_bookingstatus_value",
        work_order_nav: "msdyn_workorder",
    },
    work_order: WorkOrderSchema {
        entity_set: "msdyn_workorders",
        id: "msdyn_workorderid",
        number: "msdyn_name",
        system_status: "msdyn_systemstatus",
        summary: "msdyn_workordersummary",
        instructions: "msdyn_instructions",
        service_account_nav: "msdyn_serviceaccount",
        incident_type_nav: "msdyn_primaryincidenttype",
        incident_type_name: "msdyn_name",
        bookings_nav: "msdyn_msdyn_workorder_bookableresourcebooking_WorkOrder",
    },
    account: AccountSchema {
        entity_set: "accounts",
        id: "accountid",
        name: "name",
        address: "address1_composite",
        phone: "telephone1",
    },
    annotation: AnnotationSchema {
        entity_set: "annotations",
        id: "annotationid",
        subject: "subject",
        filename: "filename",
        mime_type: "mimetype",
        document_body: "documentbody",
        is_document: "isdocument",
        file_size: "filesize",
        created_on: "createdon",
        regarding_lookup: "_objectid_value",
        regarding_work_order_bind: "objectid_msdyn_workorder@odata.bind",
    },
};

/// Work order system status (`msdyn_systemstatus` option set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    Unscheduled,
    Scheduled,
    InProgress,
    Completed,
    Posted,
    Canceled,
}

impl WorkOrderStatus {
    pub const ALL: [WorkOrderStatus; 6] = [
        WorkOrderStatus::Unscheduled,
        WorkOrderStatus::Scheduled,
        WorkOrderStatus::InProgress,
        WorkOrderStatus::Completed,
        WorkOrderStatus::Posted,
        WorkOrderStatus::Canceled,
    ];

    pub fn code(self) -> i64 {
        match self {
            WorkOrderStatus::Unscheduled => 690_970_000,
            WorkOrderStatus::Scheduled => 690_970_001,
            WorkOrderStatus::InProgress => 690_970_002,
            WorkOrderStatus::Completed => 690_970_003,
            WorkOrderStatus::Posted => 690_970_004,
            WorkOrderStatus::Canceled => 690_970_005,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn label(self) -> &'static str {
        match self {
            WorkOrderStatus::Unscheduled => "Open - Unscheduled",
            WorkOrderStatus::Scheduled => "Open - Scheduled",
            WorkOrderStatus::InProgress => "Open - In Progress",
            WorkOrderStatus::Completed => "Open - Completed",
            WorkOrderStatus::Posted => "Closed - Posted",
            WorkOrderStatus::Canceled => "Closed - Canceled",
        }
    }

    /// Key used on the HTTP surface (`in_progress`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            WorkOrderStatus::Unscheduled => "unscheduled",
            WorkOrderStatus::Scheduled => "scheduled",
            WorkOrderStatus::InProgress => "in_progress",
            WorkOrderStatus::Completed => "completed",
            WorkOrderStatus::Posted => "posted",
            WorkOrderStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkOrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == key)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|s| s.as_str()).collect();
                format!("unknown status '{s}', expected one of: {}", known.join(", "))
            })
    }
}
