//! Booking state accumulated across a conversation
//!
//! The state is built incrementally by the extractor, filled in by the
//! availability search and moved forward by reservation, approval and payment.
//! Every mutation goes through a method here so that the invariants
//! (valid dates, downstream reset on change, approval before payment) hold
//! regardless of which agent or tool drives the change.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Booking state shared between the orchestrator and the tools of one turn
pub type SharedBooking = Arc<Mutex<BookingState>>;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Hotel price as returned by the MCP server, either a number or a free-form string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Price {
    Amount(serde_json::Number),
    Text(String),
}

impl Default for Price {
    fn default() -> Self {
        Price::Text(String::new())
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Price::Amount(amount) => match amount.as_f64() {
                Some(value) if value.fract() == 0.0 => write!(f, "${:.0}", value),
                Some(value) => write!(f, "${:.2}", value),
                None => write!(f, "${}", amount),
            },
            Price::Text(text) => write!(f, "{}", text),
        }
    }
}

/// A hotel offered by the availability search. Passed through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelOption {
    pub hotel_name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub dates: String,
    #[serde(default)]
    pub room_type: String,
    #[serde(default)]
    pub price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// A request shown to the user with approve/reject buttons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// What the reservation endpoint asked to be paid, when the 402 said so
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// Amount in token atomic units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_formatted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pay_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PaymentDetails {
    pub fn summary(&self) -> String {
        let amount = self
            .amount_formatted
            .clone()
            .or_else(|| self.amount.clone())
            .unwrap_or_else(|| "an unspecified amount".to_string());
        let mut out = amount;
        if self.amount_formatted.is_some() || self.amount.is_some() {
            out.push_str(" USDC");
        }
        if let Some(ref network) = self.network {
            out.push_str(&format!(" on {}", network));
        }
        out
    }
}

/// Fields the extractor may set. Everything is optional so partial updates work.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingDetails {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub checkin_date: Option<String>,
    #[serde(default)]
    pub checkout_date: Option<String>,
    #[serde(default)]
    pub guests: Option<i64>,
}

/// Where the booking currently stands, derived from the state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStage {
    CollectingDetails,
    ChoosingHotel,
    Reserving,
    AwaitingApproval,
    Paying,
    Completed,
}

impl std::fmt::Display for BookingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingStage::CollectingDetails => write!(f, "collecting_details"),
            BookingStage::ChoosingHotel => write!(f, "choosing_hotel"),
            BookingStage::Reserving => write!(f, "reserving"),
            BookingStage::AwaitingApproval => write!(f, "awaiting_approval"),
            BookingStage::Paying => write!(f, "paying"),
            BookingStage::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingState {
    pub destination: Option<String>,
    pub checkin_date: Option<NaiveDate>,
    pub checkout_date: Option<NaiveDate>,
    pub guests: Option<u32>,
    pub hotels: Vec<HotelOption>,
    pub selected_hotel: Option<HotelOption>,
    pub payment_required: bool,
    pub payment_details: Option<PaymentDetails>,
    pub approval: Option<ApprovalRequest>,
    pub reservation_created: bool,
    pub reservation: Option<Value>,
}

impl BookingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedBooking {
        Arc::new(Mutex::new(self))
    }

    /// Search parameters not yet known, in the order they should be asked for
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.destination.is_none() {
            missing.push("destination");
        }
        if self.checkin_date.is_none() {
            missing.push("checkin_date");
        }
        if self.checkout_date.is_none() {
            missing.push("checkout_date");
        }
        if self.guests.is_none() {
            missing.push("guests");
        }
        missing
    }

    pub fn nights(&self) -> Option<i64> {
        match (self.checkin_date, self.checkout_date) {
            (Some(checkin), Some(checkout)) => Some((checkout - checkin).num_days()),
            _ => None,
        }
    }

    /// Merge extracted details. The whole update is validated before anything
    /// is written, so an invalid field leaves the state untouched.
    /// Returns the names of the fields that actually changed.
    pub fn apply_details(&mut self, details: &BookingDetails) -> Result<Vec<&'static str>, String> {
        let destination = match details.destination.as_deref().map(str::trim) {
            Some("") => return Err("destination cannot be empty".to_string()),
            Some(d) => Some(d.to_string()),
            None => None,
        };
        let checkin = details
            .checkin_date
            .as_deref()
            .map(|d| parse_date("checkin_date", d))
            .transpose()?;
        let checkout = details
            .checkout_date
            .as_deref()
            .map(|d| parse_date("checkout_date", d))
            .transpose()?;
        let guests = match details.guests {
            Some(g) if g < 1 => return Err(format!("guests must be at least 1, got {}", g)),
            Some(g) => Some(u32::try_from(g).map_err(|_| format!("guests value {} is too large", g))?),
            None => None,
        };

        if let (Some(ci), Some(co)) = (checkin.or(self.checkin_date), checkout.or(self.checkout_date)) {
            if co <= ci {
                return Err(format!(
                    "check-out date ({}) must be after check-in date ({})",
                    co, ci
                ));
            }
        }

        let mut changed = Vec::new();
        if let Some(d) = destination {
            if self.destination.as_deref() != Some(d.as_str()) {
                self.destination = Some(d);
                changed.push("destination");
            }
        }
        if let Some(ci) = checkin {
            if self.checkin_date != Some(ci) {
                self.checkin_date = Some(ci);
                changed.push("checkin_date");
            }
        }
        if let Some(co) = checkout {
            if self.checkout_date != Some(co) {
                self.checkout_date = Some(co);
                changed.push("checkout_date");
            }
        }
        if let Some(g) = guests {
            if self.guests != Some(g) {
                self.guests = Some(g);
                changed.push("guests");
            }
        }

        if !changed.is_empty() {
            self.reset_search_results();
        }

        Ok(changed)
    }

    /// Forget everything derived from the previous search parameters
    fn reset_search_results(&mut self) {
        self.hotels.clear();
        self.selected_hotel = None;
        self.reset_payment();
        self.reservation_created = false;
        self.reservation = None;
    }

    fn reset_payment(&mut self) {
        self.payment_required = false;
        self.payment_details = None;
        self.approval = None;
    }

    /// Replace the offered hotels with a fresh search result
    pub fn set_hotels(&mut self, hotels: Vec<HotelOption>) {
        self.hotels = hotels;
        self.selected_hotel = None;
        self.reset_payment();
    }

    /// Select one of the offered hotels by name, unique name fragment or
    /// 1-based index (`2` or `#2`).
    pub fn select_hotel(&mut self, choice: &str) -> Result<HotelOption, String> {
        if self.hotels.is_empty() {
            return Err("No hotels have been offered yet. Check availability first.".to_string());
        }

        let choice = choice.trim();
        if choice.is_empty() {
            return Err(format!("No hotel given. Choose one of: {}", self.hotel_choices()));
        }

        let index_str = choice.strip_prefix('#').unwrap_or(choice).trim();
        let selected = if let Ok(index) = index_str.parse::<usize>() {
            if index == 0 || index > self.hotels.len() {
                return Err(format!(
                    "There is no option #{}. Choose one of: {}",
                    index,
                    self.hotel_choices()
                ));
            }
            self.hotels[index - 1].clone()
        } else {
            let needle = choice.to_lowercase();
            if let Some(exact) = self.hotels.iter().find(|h| h.hotel_name.to_lowercase() == needle) {
                exact.clone()
            } else {
                let matches: Vec<&HotelOption> = self
                    .hotels
                    .iter()
                    .filter(|h| h.hotel_name.to_lowercase().contains(&needle))
                    .collect();
                match matches.as_slice() {
                    [only] => (*only).clone(),
                    [] => {
                        return Err(format!(
                            "No offered hotel matches '{}'. Choose one of: {}",
                            choice,
                            self.hotel_choices()
                        ))
                    }
                    several => {
                        let names: Vec<&str> = several.iter().map(|h| h.hotel_name.as_str()).collect();
                        return Err(format!(
                            "'{}' matches several hotels: {}. Please be more specific.",
                            choice,
                            names.join(", ")
                        ));
                    }
                }
            }
        };

        if self.selected_hotel.as_ref() != Some(&selected) {
            self.reset_payment();
        }
        self.selected_hotel = Some(selected.clone());
        Ok(selected)
    }

    fn hotel_choices(&self) -> String {
        self.hotels
            .iter()
            .enumerate()
            .map(|(i, h)| format!("#{} {}", i + 1, h.hotel_name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn stage(&self) -> BookingStage {
        if self.reservation_created {
            return BookingStage::Completed;
        }
        if self.payment_required {
            return match self.approval.as_ref().map(|a| a.status) {
                Some(ApprovalStatus::Approved) => BookingStage::Paying,
                _ => BookingStage::AwaitingApproval,
            };
        }
        if !self.missing_fields().is_empty() {
            BookingStage::CollectingDetails
        } else if self.selected_hotel.is_none() {
            BookingStage::ChoosingHotel
        } else {
            BookingStage::Reserving
        }
    }

    /// Arguments for the MCP `check_availability` tool
    pub fn availability_query(&self) -> Result<Value, String> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(format!("Cannot search yet, missing: {}", missing.join(", ")));
        }
        Ok(json!({
            "destination": self.destination,
            "checkIn": self.checkin_date.map(|d| d.format(DATE_FORMAT).to_string()),
            "checkOut": self.checkout_date.map(|d| d.format(DATE_FORMAT).to_string()),
            "guests": self.guests,
        }))
    }

    /// Body for the reservation request, both over MCP and over REST
    pub fn reservation_request(&self) -> Result<Value, String> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(format!("Cannot reserve yet, missing: {}", missing.join(", ")));
        }
        let hotel = self
            .selected_hotel
            .as_ref()
            .ok_or_else(|| "No hotel has been selected yet".to_string())?;
        Ok(json!({
            "hotelName": hotel.hotel_name,
            "location": hotel.location,
            "roomType": hotel.room_type,
            "price": hotel.price,
            "destination": self.destination,
            "checkIn": self.checkin_date.map(|d| d.format(DATE_FORMAT).to_string()),
            "checkOut": self.checkout_date.map(|d| d.format(DATE_FORMAT).to_string()),
            "guests": self.guests,
        }))
    }

    pub fn mark_payment_required(&mut self, details: Option<PaymentDetails>) {
        self.payment_required = true;
        self.payment_details = details;
        self.approval = None;
    }

    pub fn mark_reserved(&mut self, reservation: Option<Value>) {
        self.reservation_created = true;
        self.payment_required = false;
        self.reservation = reservation;
    }

    pub fn is_payment_approved(&self) -> bool {
        self.approval
            .as_ref()
            .map(|a| a.status == ApprovalStatus::Approved)
            .unwrap_or(false)
    }

    /// Open a new approval request for the pending payment. A previous pending
    /// or rejected request is replaced.
    pub fn request_approval(&mut self, title: &str, description: &str) -> Result<ApprovalRequest, String> {
        if self.reservation_created {
            return Err("The reservation is already complete; there is nothing to approve".to_string());
        }
        if !self.payment_required {
            return Err("No payment is pending; there is nothing to approve".to_string());
        }
        if self.is_payment_approved() {
            return Err("The payment has already been approved".to_string());
        }
        if title.trim().is_empty() {
            return Err("Approval title cannot be empty".to_string());
        }

        let request = ApprovalRequest {
            id: format!("apr_{}", &Uuid::new_v4().simple().to_string()[..12]),
            title: title.trim().to_string(),
            description: description.trim().to_string(),
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        };
        self.approval = Some(request.clone());
        Ok(request)
    }

    /// Resolve the pending approval request
    pub fn resolve_approval(&mut self, approved: bool) -> Result<ApprovalRequest, String> {
        let approval = self
            .approval
            .as_mut()
            .ok_or_else(|| "There is no approval request to resolve".to_string())?;
        if approval.status != ApprovalStatus::Pending {
            return Err(format!("The approval request was already {}", approval.status));
        }
        approval.status = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        approval.resolved_at = Some(Utc::now());
        Ok(approval.clone())
    }

    /// Human-readable state for agent prompts
    pub fn format_summary(&self) -> String {
        let unknown = || "unknown".to_string();
        let mut out = String::new();

        out.push_str(&format!(
            "- Destination: {}\n",
            self.destination.clone().unwrap_or_else(unknown)
        ));
        out.push_str(&format!(
            "- Check-in: {}\n",
            self.checkin_date.map(|d| d.to_string()).unwrap_or_else(unknown)
        ));
        match self.nights() {
            Some(n) => out.push_str(&format!(
                "- Check-out: {} ({} night{})\n",
                self.checkout_date.map(|d| d.to_string()).unwrap_or_else(unknown),
                n,
                if n == 1 { "" } else { "s" }
            )),
            None => out.push_str(&format!(
                "- Check-out: {}\n",
                self.checkout_date.map(|d| d.to_string()).unwrap_or_else(unknown)
            )),
        }
        out.push_str(&format!(
            "- Guests: {}\n",
            self.guests.map(|g| g.to_string()).unwrap_or_else(unknown)
        ));

        if self.hotels.is_empty() {
            out.push_str("- Hotels offered: none yet\n");
        } else {
            out.push_str(&format!("- Hotels offered ({}):\n", self.hotels.len()));
            for (i, hotel) in self.hotels.iter().enumerate() {
                out.push_str(&format!(
                    "  {}. {} ({}, {}, {})\n",
                    i + 1,
                    hotel.hotel_name,
                    hotel.location,
                    hotel.room_type,
                    hotel.price
                ));
            }
        }

        match self.selected_hotel {
            Some(ref hotel) => out.push_str(&format!(
                "- Selected hotel: {} ({}, {})\n",
                hotel.hotel_name, hotel.room_type, hotel.price
            )),
            None => out.push_str("- Selected hotel: none\n"),
        }

        if self.payment_required {
            match self.payment_details {
                Some(ref details) => {
                    out.push_str(&format!("- Payment required: yes, {}\n", details.summary()))
                }
                None => out.push_str("- Payment required: yes\n"),
            }
        } else {
            out.push_str("- Payment required: no\n");
        }

        if let Some(ref approval) = self.approval {
            out.push_str(&format!("- Approval: {} ({})\n", approval.status, approval.title));
        }

        out.push_str(&format!(
            "- Reservation created: {}\n",
            if self.reservation_created { "yes" } else { "no" }
        ));

        out
    }
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| format!("{} must be a date in YYYY-MM-DD format, got '{}'", field, value))
}
