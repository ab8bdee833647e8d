/// What the user can ask of the check-in screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Submit,
    Retry,
    DismissError,
    DismissNotice,
}
