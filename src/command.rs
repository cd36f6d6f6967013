use futures::{
    FutureExt, Stream, StreamExt,
    stream::{BoxStream, select_all},
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A command that can be executed to perform side effects.
///
/// Commands represent asynchronous operations that produce messages, such as a
/// mutation whose result should flow back into the owner's update loop.
///
/// # Examples
///
/// ```
/// use recall::command::Command;
///
/// enum Message {
///     GotResult(i32),
/// }
///
/// // Create a command that performs an async operation
/// let cmd = Command::perform(
///     async { 42 },
///     |result| Message::GotResult(result)
/// );
/// ```
pub struct Command<Msg: Send + 'static> {
    pub(crate) stream: Option<BoxStream<'static, Msg>>,
}

impl<Msg: Send + 'static> Command<Msg> {
    /// Create a command that does nothing.
    ///
    /// ```
    /// use recall::command::Command;
    ///
    /// let cmd: Command<i32> = Command::none();
    /// assert!(cmd.is_none());
    /// ```
    #[must_use]
    pub fn none() -> Self {
        Self { stream: None }
    }

    /// Perform an asynchronous operation and convert its result to a message.
    ///
    /// # Arguments
    ///
    /// * `future` - The async operation to perform
    /// * `f` - Function to convert the result into a message
    pub fn perform<A>(
        future: impl Future<Output = A> + Send + 'static,
        f: impl FnOnce(A) -> Msg + Send + 'static,
    ) -> Self {
        Self::future(future.map(f))
    }

    /// Create a command from a future that produces a message.
    ///
    /// ```
    /// use recall::command::Command;
    ///
    /// let cmd = Command::future(async { 42 });
    /// ```
    pub fn future(future: impl Future<Output = Msg> + Send + 'static) -> Self {
        Self {
            stream: Some(future.into_stream().boxed()),
        }
    }

    /// Batch multiple commands into a single command.
    ///
    /// All commands will be executed concurrently. The order in which
    /// messages arrive is not guaranteed. Commands that are `Command::none()`
    /// are automatically filtered out.
    pub fn batch(commands: impl IntoIterator<Item = Self>) -> Self {
        let streams: Vec<_> = commands.into_iter().filter_map(|cmd| cmd.stream).collect();

        if streams.is_empty() {
            Self::none()
        } else {
            Self {
                stream: Some(select_all(streams).boxed()),
            }
        }
    }

    /// Create a command from a stream of messages.
    pub fn stream(stream: impl Stream<Item = Msg> + Send + 'static) -> Self {
        Self {
            stream: Some(stream.boxed()),
        }
    }

    /// Convert every message this command produces.
    #[must_use]
    pub fn map<U: Send + 'static>(self, f: impl Fn(Msg) -> U + Send + 'static) -> Command<U> {
        Command {
            stream: self.stream.map(|stream| stream.map(f).boxed()),
        }
    }

    /// Returns `true` if the command produces nothing.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.stream.is_none()
    }

    /// Returns the underlying message stream, or `None` for `Command::none()`.
    #[must_use]
    pub fn into_stream(self) -> Option<BoxStream<'static, Msg>> {
        self.stream
    }

    /// Runs the command on the tokio runtime, forwarding every message to `tx`.
    ///
    /// Returns `None` for `Command::none()`. Forwarding stops once the receiver
    /// is dropped.
    pub fn spawn(self, tx: mpsc::UnboundedSender<Msg>) -> Option<JoinHandle<()>> {
        let mut stream = self.stream?;
        Some(tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                if tx.send(msg).is_err() {
                    break;
                }
            }
        }))
    }
}
