pub mod booking;
pub mod thread;

pub use booking::{
    ApprovalRequest, ApprovalStatus, BookingDetails, BookingStage, BookingState, HotelOption,
    PaymentDetails, Price, SharedBooking,
};
pub use thread::{ThreadItem, ThreadItemType, ThreadMetadata, WidgetAction, WidgetContent};
